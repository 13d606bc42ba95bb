//! # Engine Configuration
//!
//! TOML-backed settings with per-field defaults. The widening threshold
//! normally comes from the domain; the config can override it for
//! experiments.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget in seconds; `None` runs unbounded.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// How long to wait for workers to drain after cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Interval of the in-flight progress log line.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Override of the domain-supplied widening threshold.
    #[serde(default)]
    pub widening_threshold: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            widening_threshold: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config '{}': {}", path.display(), e))?;
        toml::from_str(&raw).map_err(|e| format!("invalid config '{}': {}", path.display(), e))
    }

    /// Missing file falls back to defaults; a present but broken file is
    /// still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(c.deadline_secs, None);
        assert_eq!(c.shutdown_grace_ms, 2_000);
        assert_eq!(c.widening_threshold, None);
    }

    #[test]
    fn test_partial_override() {
        let c: EngineConfig = toml::from_str("deadline_secs = 30\nwidening_threshold = 2").unwrap();
        assert_eq!(c.deadline(), Some(Duration::from_secs(30)));
        assert_eq!(c.widening_threshold, Some(2));
        assert_eq!(c.progress_interval_ms, 1_000);
    }
}
