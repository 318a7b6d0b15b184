//! Filter-driven traversal.

use super::node_store::NodeReader;
use super::rtree_types::{Entry, NodeBody, NodeId, SpatialResult};
use crate::filter::{SearchFilter, VisitDecision};
use crate::monitor::{
    TreeMonitor, CASE_ENTRY_DOES_NOT_MATCH, CASE_ENTRY_MATCHES, CASE_INDEX_DOES_NOT_MATCH,
    CASE_INDEX_MATCHES,
};

/// Walks the tree from the root, pruning every subtree the filter rejects,
/// and reports each accepted entry to `on_match` in stored order.
pub(crate) fn traverse<R: NodeReader + ?Sized>(
    reader: &R,
    filter: &dyn SearchFilter,
    monitor: &dyn TreeMonitor,
    on_match: &mut dyn FnMut(&Entry),
) -> SpatialResult<()> {
    visit(reader, reader.root(), 0, false, filter, monitor, on_match)
}

fn visit<R: NodeReader + ?Sized>(
    reader: &R,
    id: NodeId,
    level: usize,
    include_all: bool,
    filter: &dyn SearchFilter,
    monitor: &dyn TreeMonitor,
    on_match: &mut dyn FnMut(&Entry),
) -> SpatialResult<()> {
    let node = reader.node(id)?;

    let include_all = include_all
        || match filter.visit_decision(&node.envelope) {
            VisitDecision::IncludeAll => true,
            VisitDecision::Filter => false,
            VisitDecision::ExcludeAll => {
                monitor.add_case(CASE_INDEX_DOES_NOT_MATCH);
                return Ok(());
            }
        };
    monitor.add_case(CASE_INDEX_MATCHES);
    monitor.matched_tree_node(level, id);

    match &node.body {
        NodeBody::Branch(children) => {
            for child in children {
                visit(reader, *child, level + 1, include_all, filter, monitor, on_match)?;
            }
        }
        NodeBody::Leaf(entries) => {
            for entry in entries {
                if include_all || filter.matches(entry) {
                    monitor.add_case(CASE_ENTRY_MATCHES);
                    on_match(entry);
                } else {
                    monitor.add_case(CASE_ENTRY_DOES_NOT_MATCH);
                }
            }
        }
    }
    Ok(())
}
