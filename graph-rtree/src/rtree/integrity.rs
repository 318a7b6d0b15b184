//! Structural integrity checking of a committed tree.
//!
//! The check never repairs anything. It walks the tree from the root and
//! reports every disagreement it finds:
//! - stored envelopes that differ from the union of their children
//! - non-root nodes outside the fanout bounds
//! - leaves at different depths
//! - broken parent back-links and parent cycles
//! - inbound references that do not point at the leaf holding the entry
//! - nodes unreachable from the root
//! - a trusted cached count that differs from the real one

use std::collections::HashSet;

use super::node_store::{NodeReader, TreeState};
use super::rtree_types::{NodeBody, NodeId};

// ============================================================================
// Integrity Checking
// ============================================================================

/// Result of integrity check operation
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes reached from the root
    pub nodes_checked: u64,
    /// Total leaf entries reached from the root
    pub entries_checked: u64,
    /// Depth of the leaves, when they agree
    pub tree_height: u32,
    /// Nodes stored but unreachable from the root
    pub orphaned_nodes: Vec<NodeId>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_checked: 0,
            tree_height: 0,
            orphaned_nodes: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_tree(state: &TreeState) -> IntegrityReport {
    let mut report = IntegrityReport::new();
    let metadata = state.metadata();
    let root = state.root();

    let mut visited = HashSet::new();
    let mut leaf_depth: Option<u32> = None;
    let mut stack: Vec<(NodeId, Option<NodeId>, u32)> = vec![(root, None, 1)];

    while let Some((id, expected_parent, depth)) = stack.pop() {
        if !visited.insert(id) {
            report.fail(format!("node {} is reachable twice", id));
            continue;
        }
        let node = match state.node(id) {
            Ok(node) => node,
            Err(e) => {
                report.fail(e.to_string());
                continue;
            }
        };
        report.nodes_checked += 1;

        if node.parent != expected_parent {
            report.fail(format!(
                "node {} records parent {:?} but is linked under {:?}",
                id, node.parent, expected_parent
            ));
        }

        match state.children_envelope(id) {
            Ok(exact) if exact != node.envelope => report.fail(format!(
                "node {} stores {} but its children cover {}",
                id, node.envelope, exact
            )),
            Ok(_) => {}
            Err(e) => report.fail(e.to_string()),
        }

        let len = node.len();
        if len > metadata.max_node_references {
            report.fail(format!(
                "node {} holds {} references, more than {}",
                id, len, metadata.max_node_references
            ));
        }
        if id != root && len < metadata.min_node_references {
            report.fail(format!(
                "node {} holds {} references, fewer than {}",
                id, len, metadata.min_node_references
            ));
        }

        match &node.body {
            NodeBody::Branch(children) => {
                if children.is_empty() {
                    report.fail(format!("branch {} has no children", id));
                }
                for child in children {
                    stack.push((*child, Some(id), depth + 1));
                }
            }
            NodeBody::Leaf(entries) => {
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(expected) if expected != depth => report.fail(format!(
                        "leaf {} is at depth {} but other leaves are at depth {}",
                        id, depth, expected
                    )),
                    Some(_) => {}
                }
                for entry in entries {
                    report.entries_checked += 1;
                    if state.leaf_of(entry.object) != Some(id) {
                        report.fail(format!(
                            "object {} sits in leaf {} but is referenced from {:?}",
                            entry.object,
                            id,
                            state.leaf_of(entry.object)
                        ));
                    }
                }
            }
        }
    }

    report.tree_height = leaf_depth.unwrap_or(0);

    let mut orphans: Vec<NodeId> = state
        .nodes
        .keys()
        .filter(|id| !visited.contains(*id))
        .copied()
        .collect();
    orphans.sort_unstable();
    if !orphans.is_empty() {
        report.fail(format!("{} nodes are unreachable from the root", orphans.len()));
    }
    report.orphaned_nodes = orphans;

    if state.references.len() as u64 != report.entries_checked {
        report.fail(format!(
            "{} inbound references for {} entries",
            state.references.len(),
            report.entries_checked
        ));
    }
    if metadata.total_count > 0 && metadata.total_count != report.entries_checked {
        report.fail(format!(
            "cached count {} differs from {} entries",
            metadata.total_count, report.entries_checked
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::rtree::rtree_config::RTreeConfig;
    use crate::rtree::rtree_types::{Entry, IndexNode};

    fn leaf(parent: NodeId, entries: Vec<Entry>) -> IndexNode {
        IndexNode {
            envelope: Envelope::union_all(entries.iter().map(|e| &e.envelope)),
            parent: Some(parent),
            body: NodeBody::Leaf(entries),
        }
    }

    fn valid_state() -> TreeState {
        // root(2) -> [leaf(3): objects 1,2 ; leaf(4): objects 3,4]
        let config = RTreeConfig::new(4, 2).unwrap();
        let mut state = TreeState::new(&config, 0);
        let e = |object: u64, x: f64| Entry::new(object, Envelope::point(x, x));
        state.nodes.insert(3, leaf(2, vec![e(1, 0.0), e(2, 1.0)]));
        state.nodes.insert(4, leaf(2, vec![e(3, 5.0), e(4, 6.0)]));
        state.nodes.insert(
            2,
            IndexNode {
                envelope: Envelope::new(0.0, 0.0, 6.0, 6.0),
                parent: None,
                body: NodeBody::Branch(vec![3, 4]),
            },
        );
        for (object, node) in [(1, 3), (2, 3), (3, 4), (4, 4)] {
            state.references.insert(object, node);
        }
        state.metadata.total_count = 4;
        state.next_id = 5;
        state
    }

    #[test]
    fn test_integrity_report_creation() {
        let report = IntegrityReport::new();
        assert!(report.is_valid);
        assert_eq!(report.nodes_checked, 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_valid_tree() {
        let report = check_tree(&valid_state());
        assert!(report.is_valid, "{:?}", report.errors);
        assert_eq!(report.nodes_checked, 3);
        assert_eq!(report.entries_checked, 4);
        assert_eq!(report.tree_height, 2);
    }

    #[test]
    fn test_empty_tree_is_valid() {
        let state = TreeState::new(&RTreeConfig::default(), 0);
        let report = check_tree(&state);
        assert!(report.is_valid, "{:?}", report.errors);
        assert_eq!(report.tree_height, 1);
    }

    #[test]
    fn test_detects_stale_envelope() {
        let mut state = valid_state();
        if let Some(root) = state.nodes.get_mut(&2) {
            root.envelope = Envelope::new(0.0, 0.0, 100.0, 100.0);
        }
        let report = check_tree(&state);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("node 2"));
    }

    #[test]
    fn test_detects_orphans_and_bad_references() {
        let mut state = valid_state();
        state.nodes.insert(9, IndexNode::empty_leaf());
        state.references.insert(3, 3);

        let report = check_tree(&state);
        assert!(!report.is_valid);
        assert_eq!(report.orphaned_nodes, vec![9]);
        assert!(report.errors.iter().any(|e| e.contains("object 3")));
    }

    #[test]
    fn test_detects_underfull_node_and_wrong_count() {
        let mut state = valid_state();
        if let Some(node) = state.nodes.get_mut(&4) {
            node.body = NodeBody::Leaf(vec![Entry::new(3, Envelope::point(5.0, 5.0))]);
            node.envelope = Envelope::point(5.0, 5.0);
        }
        if let Some(root) = state.nodes.get_mut(&2) {
            root.envelope = Envelope::new(0.0, 0.0, 5.0, 5.0);
        }
        state.references.remove(&4);

        let report = check_tree(&state);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("fewer than 2")));
        assert!(report.errors.iter().any(|e| e.contains("cached count 4")));
    }
}
