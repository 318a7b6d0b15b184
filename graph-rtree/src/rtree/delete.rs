//! Deletion engine: entry removal, condensation and re-insertion.
//!
//! Removing an entry may leave its leaf below the minimum fill. The highest
//! ancestor that would underflow together with it is unlinked and destroyed,
//! and every entry below it is inserted again from the root. The root itself
//! is never removed; a root with a single child is kept as it is.

use super::insert::insert_entry;
use super::node_store::NodeReader;
use super::rtree_config::SplitMode;
use super::rtree_types::{Entry, NodeId, ObjectId, SpatialError, SpatialResult};
use super::transaction::WriteTransaction;
use crate::monitor::TreeMonitor;

/// Removes the entry of `object` and returns it.
///
/// Fails with [`SpatialError::NotIndexed`] when no leaf references the
/// object, and with [`SpatialError::NotIndexedInThisTree`] when the
/// referencing leaf does not hang below this tree's root.
pub(crate) fn delete_entry(
    txn: &mut WriteTransaction<'_>,
    object: ObjectId,
    split_mode: SplitMode,
    monitor: &dyn TreeMonitor,
) -> SpatialResult<Entry> {
    let leaf = txn.leaf_of(object).ok_or(SpatialError::NotIndexed(object))?;
    let top = txn.top_of(leaf, txn.node_count())?;
    if top != txn.root() {
        return Err(SpatialError::NotIndexedInThisTree(object));
    }

    let entry = txn.remove_entry(leaf, object)?;
    log::trace!("Object {} removed from leaf {}", object, leaf);
    condense_tree(txn, leaf, split_mode, monitor)?;
    Ok(entry)
}

fn condense_tree(
    txn: &mut WriteTransaction<'_>,
    leaf: NodeId,
    split_mode: SplitMode,
    monitor: &dyn TreeMonitor,
) -> SpatialResult<()> {
    let min = txn.metadata().min_node_references;
    let root = txn.root();
    if leaf == root || txn.node(leaf)?.len() >= min {
        return refresh_path(txn, leaf);
    }

    let mut removed = leaf;
    let mut parent = parent_of(txn, removed)?;
    while parent != root && txn.node(parent)?.len() == min {
        removed = parent;
        parent = parent_of(txn, removed)?;
    }

    let (orphans, doomed) = collect_subtree(txn, removed)?;
    txn.remove_child(parent, removed)?;
    for id in doomed {
        txn.destroy_node(id)?;
    }
    for entry in &orphans {
        txn.forget_reference(entry.object);
    }
    if txn.node(parent)?.is_empty() {
        txn.reset_to_empty_leaf(parent)?;
    }
    refresh_path(txn, parent)?;

    log::debug!(
        "Condensed subtree at node {}, re-inserting {} entries",
        removed,
        orphans.len()
    );
    for entry in orphans {
        insert_entry(txn, entry, split_mode, monitor)?;
    }
    monitor.add_rebuilt();
    Ok(())
}

fn parent_of(txn: &WriteTransaction<'_>, id: NodeId) -> SpatialResult<NodeId> {
    txn.parent(id)?.ok_or_else(|| {
        SpatialError::InvariantViolation(format!("non-root node {} has no parent", id))
    })
}

/// Entries and node ids below `id`, both in stored order, `id` included.
fn collect_subtree(
    txn: &WriteTransaction<'_>,
    id: NodeId,
) -> SpatialResult<(Vec<Entry>, Vec<NodeId>)> {
    let mut entries = Vec::new();
    let mut nodes = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let node = txn.node(current)?;
        nodes.push(current);
        entries.extend_from_slice(node.entries());
        stack.extend(node.children().iter().rev().copied());
    }
    Ok((entries, nodes))
}

/// Recomputes envelopes from `from` upwards until one stays the same.
fn refresh_path(txn: &mut WriteTransaction<'_>, from: NodeId) -> SpatialResult<()> {
    let mut current = from;
    while txn.recompute_bounding_box(current)? {
        match txn.parent(current)? {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(())
}
