//! # sunder-cli — The "Moat" of SUNDER
//!
//! Minimal CLI interface for the distributed block-summary engine.
//!
//! - `sunder run --task <path>` — Analyze a task file to a verdict.
//! - `sunder inspect --task <path>` — Print the block graph of a task.
//! - `sunder verify` — Run Kani proofs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sunder_domain::AnalysisTask;
use sunder_engine::{run_analysis, AnalysisOutcome, EngineConfig, TracingSink};

/// ⚔️ SUNDER — A distributed, summary-passing program verification engine.
#[derive(Parser)]
#[command(name = "sunder", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a task file until a verdict is reached.
    Run {
        /// Path to the task file (JSON).
        #[arg(long)]
        task: PathBuf,

        /// Path to the engine config (TOML). Missing file means defaults.
        #[arg(long, default_value = "sunder.toml")]
        config: PathBuf,

        /// Wall-clock deadline in seconds (overrides the config).
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Widening threshold (overrides the task and the config).
        #[arg(long)]
        widening_threshold: Option<u32>,

        /// Emit the full run report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the block graph of a task file.
    Inspect {
        /// Path to the task file (JSON).
        #[arg(long)]
        task: PathBuf,
    },

    /// Run Kani formal verification proofs.
    Verify,
}

#[derive(Tabled)]
struct SummaryRow {
    field: &'static str,
    value: String,
}

#[derive(Tabled)]
struct BlockRow {
    block: String,
    entry: u64,
    exit: u64,
    predecessors: String,
    successors: String,
    statements: usize,
}

fn load_task(path: &Path) -> AnalysisTask {
    let json = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(&format!("cannot read {}: {}", path.display(), e)));
    AnalysisTask::from_json(&json).unwrap_or_else(|e| fatal(&e))
}

fn fatal(reason: &str) -> ! {
    eprintln!("⚔️ SUNDER: {}", reason);
    std::process::exit(2);
}

fn print_report(outcome: &AnalysisOutcome) {
    let rows = vec![
        SummaryRow {
            field: "run",
            value: outcome.run_id.clone(),
        },
        SummaryRow {
            field: "verdict",
            value: outcome.verdict.to_string(),
        },
        SummaryRow {
            field: "counterexample",
            value: match &outcome.counterexample {
                Some(path) => path.join(" -> "),
                None => "-".to_string(),
            },
        },
        SummaryRow {
            field: "workers",
            value: outcome.stats.workers.to_string(),
        },
        SummaryRow {
            field: "messages routed",
            value: outcome.stats.messages_routed.to_string(),
        },
        SummaryRow {
            field: "messages coalesced",
            value: outcome.stats.messages_coalesced.to_string(),
        },
        SummaryRow {
            field: "combines",
            value: outcome.stats.combines.to_string(),
        },
        SummaryRow {
            field: "widenings",
            value: outcome.stats.widenings.to_string(),
        },
        SummaryRow {
            field: "broadcasts",
            value: outcome.stats.broadcasts.to_string(),
        },
        SummaryRow {
            field: "suppressed",
            value: outcome.stats.suppressed.to_string(),
        },
        SummaryRow {
            field: "wall time",
            value: format!("{} ms", outcome.wall_ms),
        },
    ];
    println!("{}", Table::new(rows).with(Style::sharp()));
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sunder_engine=info,sunder_cli=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            config,
            deadline_secs,
            widening_threshold,
            json,
        } => {
            let task = load_task(&task);
            let name = task.name.clone().unwrap_or_else(|| "unnamed".to_string());

            let mut config = EngineConfig::load_or_default(&config).unwrap_or_else(|e| fatal(&e));
            if deadline_secs.is_some() {
                config.deadline_secs = deadline_secs;
            }
            if widening_threshold.is_some() {
                config.widening_threshold = widening_threshold;
            }

            let (graph, analysis) = task.build().unwrap_or_else(|e| fatal(&e));

            eprintln!("⚔️ SUNDER: Analyzing task '{}'...", name);
            eprintln!("   Blocks:   {}", graph.len());
            eprintln!("   Root:     {}", graph.root_id());
            eprintln!("   Targets:  {:?}", graph.violation_locations());

            let outcome = run_analysis(graph, analysis, config, Arc::new(TracingSink)).await;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome)
                        .unwrap_or_else(|e| fatal(&e.to_string()))
                );
            } else {
                print_report(&outcome);
            }

            // UNIX-verifier exit codes: 0 safe, 1 unsafe, 2 unknown.
            let code = match outcome.verdict {
                sunder_core::Verdict::Safe => 0,
                sunder_core::Verdict::Unsafe => 1,
                _ => 2,
            };
            std::process::exit(code);
        }

        Commands::Inspect { task } => {
            let task = load_task(&task);
            let name = task.name.clone().unwrap_or_else(|| "unnamed".to_string());
            let threshold = task.widening_threshold;
            let bodies: std::collections::HashMap<_, _> = task
                .blocks
                .iter()
                .map(|b| (b.id.clone(), b.body.len()))
                .collect();

            let (graph, _) = task.build().unwrap_or_else(|e| fatal(&e));

            eprintln!("⚔️ SUNDER: Task '{}'", name);
            eprintln!("   Widening threshold: {}", threshold);
            eprintln!("   Violation targets:  {:?}", graph.violation_locations());

            let mut rows: Vec<BlockRow> = graph
                .blocks()
                .map(|b| BlockRow {
                    block: if b.is_root() {
                        format!("{} (root)", b.id)
                    } else {
                        b.id.clone()
                    },
                    entry: b.entry_location,
                    exit: b.exit_location,
                    predecessors: join_ids(&b.predecessors),
                    successors: join_ids(&b.successors),
                    statements: bodies.get(&b.id).copied().unwrap_or(0),
                })
                .collect();
            rows.sort_by(|a, b| a.block.cmp(&b.block));

            println!("{}", Table::new(rows).with(Style::sharp()));
        }

        Commands::Verify => {
            eprintln!("⚔️ SUNDER: Running formal verification...");
            eprintln!("   Tool: Kani Model Checker");
            eprintln!("   Targets: sunder-verify (lattice proofs)");
            eprintln!();

            let status = Command::new("cargo")
                .args(["kani", "--package", "sunder-verify"])
                .status();

            let passed = match status {
                Ok(status) => {
                    if status.success() {
                        eprintln!("   ✅ sunder-verify: ALL PROOFS PASSED");
                        true
                    } else {
                        eprintln!("   ❌ sunder-verify: PROOF FAILURE");
                        false
                    }
                }
                Err(e) => {
                    eprintln!("   ⚠️  Kani not found: {}", e);
                    eprintln!("   Install with: cargo install kani-verifier && cargo kani setup");
                    false
                }
            };

            if passed {
                eprintln!();
                eprintln!("⚔️ VERIFICATION COMPLETE: Lattice laws hold.");
            } else {
                eprintln!();
                eprintln!("⚔️ VERIFICATION INCOMPLETE: One or more proofs failed.");
                std::process::exit(1);
            }
        }
    }
}

fn join_ids(ids: &std::collections::BTreeSet<String>) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
