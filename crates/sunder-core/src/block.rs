//! # Block Graph
//!
//! The partition of a program's control-flow graph into connected
//! sub-graphs ("blocks"). Partitioning itself happens upstream; this
//! module only describes the result and validates its shape.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Identifier of one block. Unique within an analysis.
pub type BlockId = String;

/// Identifier of a single program location (CFG node).
pub type NodeId = u64;

/// Immutable description of one block of the decomposed program.
///
/// Every block has exactly one entry and one exit location. The block
/// graph is a DAG except for back-edges that model program loops.
/// Created once before the analysis starts, owned by the orchestrator,
/// and referenced (never copied) by workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockNode {
    /// Unique block identifier.
    pub id: BlockId,
    /// Program location at which control enters this block.
    pub entry_location: NodeId,
    /// Program location at which control leaves this block.
    pub exit_location: NodeId,
    /// Blocks whose exit feeds this block's entry.
    #[serde(default)]
    pub predecessors: BTreeSet<BlockId>,
    /// Blocks fed by this block's exit.
    #[serde(default)]
    pub successors: BTreeSet<BlockId>,
}

impl BlockNode {
    pub fn new(id: impl Into<BlockId>, entry_location: NodeId, exit_location: NodeId) -> Self {
        Self {
            id: id.into(),
            entry_location,
            exit_location,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    /// A root block has no predecessors; it contains the program entry.
    pub fn is_root(&self) -> bool {
        self.predecessors.is_empty()
    }
}

/// The whole block decomposition, keyed by block id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockGraph {
    blocks: HashMap<BlockId, BlockNode>,
    root: BlockId,
    /// Program locations designated as violations (error locations).
    #[serde(default)]
    violation_locations: BTreeSet<NodeId>,
}

impl BlockGraph {
    /// Build a graph from its blocks and validate its shape.
    ///
    /// Rejects: empty graphs, duplicate ids, edges naming unknown blocks,
    /// asymmetric edges (A lists B as successor but B does not list A as
    /// predecessor), and graphs without exactly one root block.
    pub fn new(
        blocks: Vec<BlockNode>,
        violation_locations: BTreeSet<NodeId>,
    ) -> Result<Self, String> {
        if blocks.is_empty() {
            return Err("block graph is empty".to_string());
        }

        let mut map: HashMap<BlockId, BlockNode> = HashMap::with_capacity(blocks.len());
        for block in blocks {
            if map.insert(block.id.clone(), block).is_some() {
                return Err("duplicate block id in graph".to_string());
            }
        }

        for block in map.values() {
            for succ in &block.successors {
                let other = map
                    .get(succ)
                    .ok_or_else(|| format!("block '{}' names unknown successor '{}'", block.id, succ))?;
                if !other.predecessors.contains(&block.id) {
                    return Err(format!(
                        "edge '{}' -> '{}' is not mirrored in predecessors",
                        block.id, succ
                    ));
                }
            }
            for pred in &block.predecessors {
                let other = map
                    .get(pred)
                    .ok_or_else(|| format!("block '{}' names unknown predecessor '{}'", block.id, pred))?;
                if !other.successors.contains(&block.id) {
                    return Err(format!(
                        "edge '{}' <- '{}' is not mirrored in successors",
                        block.id, pred
                    ));
                }
            }
        }

        let mut roots = map.values().filter(|b| b.is_root());
        let root = match (roots.next(), roots.next()) {
            (Some(r), None) => r.id.clone(),
            (Some(_), Some(_)) => return Err("block graph has more than one root".to_string()),
            (None, _) => return Err("block graph has no root (every block has predecessors)".to_string()),
        };

        Ok(Self {
            blocks: map,
            root,
            violation_locations,
        })
    }

    pub fn get(&self, id: &str) -> Option<&BlockNode> {
        self.blocks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blocks.contains_key(id)
    }

    /// The block containing the program entry.
    pub fn root(&self) -> &BlockNode {
        // Validated at construction.
        &self.blocks[&self.root]
    }

    pub fn root_id(&self) -> &BlockId {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.keys()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockNode> {
        self.blocks.values()
    }

    pub fn is_violation_location(&self, node: NodeId) -> bool {
        self.violation_locations.contains(&node)
    }

    pub fn violation_locations(&self) -> &BTreeSet<NodeId> {
        &self.violation_locations
    }
}

/// Convenience builder for tests and task loaders: wires mirrored edges
/// so callers only list each edge once.
#[derive(Debug, Default)]
pub struct BlockGraphBuilder {
    blocks: Vec<BlockNode>,
    edges: Vec<(BlockId, BlockId)>,
    violation_locations: BTreeSet<NodeId>,
}

impl BlockGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, id: impl Into<BlockId>, entry: NodeId, exit: NodeId) -> Self {
        self.blocks.push(BlockNode::new(id, entry, exit));
        self
    }

    pub fn edge(mut self, from: impl Into<BlockId>, to: impl Into<BlockId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn violation_location(mut self, node: NodeId) -> Self {
        self.violation_locations.insert(node);
        self
    }

    pub fn build(mut self) -> Result<BlockGraph, String> {
        for (from, to) in &self.edges {
            let mut found_from = false;
            let mut found_to = false;
            for block in &mut self.blocks {
                if &block.id == from {
                    block.successors.insert(to.clone());
                    found_from = true;
                } else if &block.id == to {
                    block.predecessors.insert(from.clone());
                    found_to = true;
                }
            }
            if !found_from || !found_to {
                return Err(format!("edge '{}' -> '{}' names an unknown block", from, to));
            }
        }
        BlockGraph::new(self.blocks, self.violation_locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> BlockGraph {
        BlockGraphBuilder::new()
            .block("B1", 0, 10)
            .block("B2", 10, 20)
            .edge("B1", "B2")
            .build()
            .unwrap()
    }

    #[test]
    fn test_linear_graph_root() {
        let g = linear_graph();
        assert_eq!(g.root().id, "B1");
        assert_eq!(g.len(), 2);
        assert!(g.get("B2").unwrap().predecessors.contains("B1"));
    }

    #[test]
    fn test_loop_graph_single_root() {
        // B2 -> B1 is a back-edge modelling a loop; B0 stays the only
        // predecessor-free block.
        let g = BlockGraphBuilder::new()
            .block("B0", 0, 5)
            .block("B1", 5, 10)
            .block("B2", 10, 5)
            .edge("B0", "B1")
            .edge("B1", "B2")
            .edge("B2", "B1")
            .build()
            .unwrap();
        assert_eq!(g.root().id, "B0");
    }

    #[test]
    fn test_unknown_successor_rejected() {
        let err = BlockGraphBuilder::new()
            .block("B1", 0, 10)
            .edge("B1", "B9")
            .build()
            .unwrap_err();
        assert!(err.contains("B9"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let blocks = vec![BlockNode::new("B1", 0, 1), BlockNode::new("B1", 1, 2)];
        assert!(BlockGraph::new(blocks, BTreeSet::new()).is_err());
    }

    #[test]
    fn test_asymmetric_edge_rejected() {
        let mut a = BlockNode::new("A", 0, 1);
        a.successors.insert("B".to_string());
        let b = BlockNode::new("B", 1, 2);
        // B does not list A as predecessor.
        let err = BlockGraph::new(vec![a, b], BTreeSet::new()).unwrap_err();
        assert!(err.contains("not mirrored"));
    }

    #[test]
    fn test_violation_location_lookup() {
        let g = BlockGraphBuilder::new()
            .block("B1", 0, 10)
            .violation_location(10)
            .build()
            .unwrap();
        assert!(g.is_violation_location(10));
        assert!(!g.is_violation_location(0));
    }
}
