//! # Analysis Tasks
//!
//! The JSON input format of the CLI: a block decomposition plus the
//! per-block statement bodies of the interval domain. Edges are listed
//! once (successors only); the loader mirrors them into predecessor
//! sets before validation.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use sunder_core::block::{BlockGraph, BlockId, BlockNode, NodeId};

use crate::interval::{interval_analysis, IntervalState, Stmt};
use crate::ops::DistributedAnalysis;

fn default_widening_threshold() -> u32 {
    4
}

/// One block of the task file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub id: BlockId,
    pub entry: NodeId,
    pub exit: NodeId,
    #[serde(default)]
    pub successors: Vec<BlockId>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// A complete analysis task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    #[serde(default)]
    pub name: Option<String>,
    pub blocks: Vec<BlockDef>,
    /// Designated error locations. Empty means every assert counts.
    #[serde(default)]
    pub violation_locations: Vec<NodeId>,
    #[serde(default = "default_widening_threshold")]
    pub widening_threshold: u32,
}

impl AnalysisTask {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid task file: {}", e))
    }

    /// Split the task into the validated block graph and the configured
    /// interval capability set.
    pub fn build(self) -> Result<(BlockGraph, DistributedAnalysis<IntervalState>), String> {
        let mut bodies: HashMap<BlockId, Vec<Stmt>> = HashMap::new();
        let mut nodes: HashMap<BlockId, BlockNode> = HashMap::new();

        for def in &self.blocks {
            if nodes.contains_key(&def.id) {
                return Err(format!("duplicate block id '{}'", def.id));
            }
            bodies.insert(def.id.clone(), def.body.clone());
            nodes.insert(def.id.clone(), BlockNode::new(def.id.clone(), def.entry, def.exit));
        }

        for def in &self.blocks {
            for succ in &def.successors {
                if !nodes.contains_key(succ) {
                    return Err(format!(
                        "block '{}' names unknown successor '{}'",
                        def.id, succ
                    ));
                }
                if let Some(n) = nodes.get_mut(&def.id) {
                    n.successors.insert(succ.clone());
                }
                if let Some(n) = nodes.get_mut(succ) {
                    n.predecessors.insert(def.id.clone());
                }
            }
        }

        let violations: BTreeSet<NodeId> = self.violation_locations.iter().copied().collect();
        let graph = BlockGraph::new(nodes.into_values().collect(), violations)?;
        Ok((graph, interval_analysis(bodies, self.widening_threshold)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINEAR: &str = r#"{
        "name": "linear",
        "blocks": [
            { "id": "B1", "entry": 0, "exit": 10,
              "successors": ["B2"],
              "body": [ { "op": "assign", "var": "x", "value": 1 } ] },
            { "id": "B2", "entry": 10, "exit": 20,
              "body": [ { "op": "assert", "var": "x", "cmp": "ge", "value": 0 } ] }
        ]
    }"#;

    #[test]
    fn test_linear_task_builds() {
        let task = AnalysisTask::from_json(LINEAR).unwrap();
        assert_eq!(task.widening_threshold, 4);
        let (graph, analysis) = task.build().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.root().id, "B1");
        assert_eq!(analysis.widening_threshold, 4);
    }

    #[test]
    fn test_unknown_successor_rejected() {
        let json = r#"{ "blocks": [ { "id": "B1", "entry": 0, "exit": 1, "successors": ["nope"] } ] }"#;
        let err = match AnalysisTask::from_json(json).unwrap().build() {
            Ok(_) => panic!("task with unknown successor must not build"),
            Err(err) => err,
        };
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_stmt_tags() {
        let json = r#"[
            { "op": "assign", "var": "x", "value": 3 },
            { "op": "add_const", "var": "x", "delta": -1 },
            { "op": "havoc", "var": "y" },
            { "op": "assume", "var": "x", "cmp": "lt", "value": 9 },
            { "op": "assert", "var": "x", "cmp": "ne", "value": 0 }
        ]"#;
        let stmts: Vec<Stmt> = serde_json::from_str(json).unwrap();
        assert_eq!(stmts.len(), 5);
        assert!(matches!(stmts[1], Stmt::AddConst { delta: -1, .. }));
    }
}
