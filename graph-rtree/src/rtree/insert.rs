//! Insertion engine: leaf selection, node splitting and path adjustment.

use super::node_store::NodeReader;
use super::rtree_config::SplitMode;
use super::rtree_types::{Entry, NodeBody, NodeId, SpatialError, SpatialResult};
use super::split::split_groups;
use super::transaction::WriteTransaction;
use crate::envelope::Envelope;
use crate::monitor::TreeMonitor;

/// Places `entry` in the tree staged by `txn`.
///
/// The caller guarantees the object is not indexed yet. Overflowing nodes are
/// split bottom-up; a split of the root grows the tree by one level.
pub(crate) fn insert_entry(
    txn: &mut WriteTransaction<'_>,
    entry: Entry,
    split_mode: SplitMode,
    monitor: &dyn TreeMonitor,
) -> SpatialResult<()> {
    let leaf = choose_leaf(txn, &entry.envelope)?;
    let widened = txn.add_entry(leaf, entry)?;
    log::trace!("Object {} placed in leaf {}", entry.object, leaf);

    if txn.node(leaf)?.len() > txn.metadata().max_node_references {
        split_and_adjust_path(txn, leaf, split_mode, monitor)
    } else if widened {
        adjust_path_bounding_box(txn, leaf)
    } else {
        Ok(())
    }
}

/// Descends from the root to the leaf best suited to hold `envelope`.
pub(crate) fn choose_leaf(txn: &WriteTransaction<'_>, envelope: &Envelope) -> SpatialResult<NodeId> {
    let mut current = txn.root();
    loop {
        let node = txn.node(current)?;
        if node.is_leaf() {
            return Ok(current);
        }
        current = choose_subtree(txn, current, node.children(), envelope)?;
    }
}

/// Picks the child of `parent` to descend into.
///
/// A child that already contains `envelope` wins, the smallest such child
/// first. Otherwise the child needing the least enlargement wins, ties going
/// to the smaller child. Remaining ties keep the first child in stored order.
fn choose_subtree<R: NodeReader + ?Sized>(
    reader: &R,
    parent: NodeId,
    children: &[NodeId],
    envelope: &Envelope,
) -> SpatialResult<NodeId> {
    if children.is_empty() {
        return Err(SpatialError::InvariantViolation(format!(
            "branch {} has no children to descend into",
            parent
        )));
    }

    let mut containing: Option<(NodeId, f64)> = None;
    for child in children {
        let child_envelope = reader.envelope(*child)?;
        if child_envelope.contains(envelope) {
            let area = child_envelope.area();
            match containing {
                Some((_, best_area)) if area >= best_area => {}
                _ => containing = Some((*child, area)),
            }
        }
    }
    if let Some((child, _)) = containing {
        return Ok(child);
    }

    let mut best = children[0];
    let mut best_enlargement = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    for child in children {
        let child_envelope = reader.envelope(*child)?;
        let enlargement = child_envelope.enlargement(envelope);
        let area = child_envelope.area();
        if enlargement < best_enlargement
            || (enlargement == best_enlargement && area < best_area)
        {
            best = *child;
            best_enlargement = enlargement;
            best_area = area;
        }
    }
    Ok(best)
}

/// Widens the ancestors of `from` until one already covers its child.
pub(crate) fn adjust_path_bounding_box(
    txn: &mut WriteTransaction<'_>,
    from: NodeId,
) -> SpatialResult<()> {
    let mut child = from;
    while let Some(parent) = txn.parent(child)? {
        let envelope = txn.envelope(child)?;
        if !txn.expand_bounding_box(parent, &envelope)? {
            break;
        }
        child = parent;
    }
    Ok(())
}

/// Splits `node` and walks up, splitting every ancestor that overflows in
/// turn and widening the rest of the path.
fn split_and_adjust_path(
    txn: &mut WriteTransaction<'_>,
    node: NodeId,
    split_mode: SplitMode,
    monitor: &dyn TreeMonitor,
) -> SpatialResult<()> {
    let max = txn.metadata().max_node_references;
    let mut current = node;
    loop {
        let sibling = split_node(txn, current, split_mode)?;
        monitor.add_split(current);
        log::debug!("Split node {} into {} and {}", current, current, sibling);

        match txn.parent(current)? {
            None => {
                create_new_root(txn, current, sibling)?;
                return Ok(());
            }
            Some(parent) => {
                let envelope = txn.envelope(current)?;
                txn.expand_bounding_box(parent, &envelope)?;
                txn.add_child(parent, sibling)?;
                if txn.node(parent)?.len() > max {
                    current = parent;
                } else {
                    return adjust_path_bounding_box(txn, parent);
                }
            }
        }
    }
}

/// Distributes the members of `id` over `id` and a new sibling, which is
/// returned unlinked.
pub(crate) fn split_node(
    txn: &mut WriteTransaction<'_>,
    id: NodeId,
    split_mode: SplitMode,
) -> SpatialResult<NodeId> {
    let min = txn.metadata().min_node_references;
    let node = txn.node_mut(id)?;
    let body = std::mem::replace(&mut node.body, NodeBody::Leaf(Vec::new()));
    node.envelope = Envelope::empty();

    match body {
        NodeBody::Leaf(entries) => {
            let envelopes: Vec<Envelope> = entries.iter().map(|e| e.envelope).collect();
            let (group1, group2) = ordered_groups(split_mode, &envelopes, min, id)?;

            let sibling = txn.create_node(NodeBody::Leaf(Vec::new()));
            for i in group1 {
                txn.add_entry(id, entries[i])?;
            }
            for i in group2 {
                txn.add_entry(sibling, entries[i])?;
            }
            Ok(sibling)
        }
        NodeBody::Branch(children) => {
            let mut envelopes = Vec::with_capacity(children.len());
            for child in &children {
                envelopes.push(txn.envelope(*child)?);
            }
            let (group1, group2) = ordered_groups(split_mode, &envelopes, min, id)?;

            txn.node_mut(id)?.body = NodeBody::Branch(Vec::new());
            let sibling = txn.create_node(NodeBody::Branch(Vec::new()));
            for i in group1 {
                txn.add_child(id, children[i])?;
            }
            for i in group2 {
                txn.add_child(sibling, children[i])?;
            }
            Ok(sibling)
        }
    }
}

fn ordered_groups(
    split_mode: SplitMode,
    envelopes: &[Envelope],
    min: usize,
    id: NodeId,
) -> SpatialResult<(Vec<usize>, Vec<usize>)> {
    let (mut group1, mut group2) = split_groups(split_mode, envelopes, min);
    if group1.is_empty() || group2.is_empty() {
        return Err(SpatialError::InvariantViolation(format!(
            "split of node {} with {} members left a group empty",
            id,
            envelopes.len()
        )));
    }
    group1.sort_unstable();
    group2.sort_unstable();
    Ok((group1, group2))
}

/// Grows the tree: a new branch root above the old root and its sibling.
fn create_new_root(
    txn: &mut WriteTransaction<'_>,
    old_root: NodeId,
    sibling: NodeId,
) -> SpatialResult<NodeId> {
    let root = txn.create_node(NodeBody::Branch(Vec::new()));
    txn.add_child(root, old_root)?;
    txn.add_child(root, sibling)?;
    txn.set_root(root)?;
    log::debug!("Tree grew a level, new root is node {}", root);
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{EmptyMonitor, RTreeMonitor};
    use crate::rtree::integrity::check_tree;
    use crate::rtree::node_store::TreeState;
    use crate::rtree::rtree_config::RTreeConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn insert_all(state: &mut TreeState, entries: &[Entry], mode: SplitMode, monitor: &dyn TreeMonitor) {
        let changes = {
            let mut txn = WriteTransaction::begin(state);
            for entry in entries {
                insert_entry(&mut txn, *entry, mode, monitor).unwrap();
            }
            txn.metadata_mut().total_count += entries.len() as u64;
            txn.into_changes()
        };
        state.apply(changes);
    }

    fn point(object: u64, x: f64, y: f64) -> Entry {
        Entry::new(object, Envelope::point(x, y))
    }

    #[test]
    fn test_insert_into_empty_root() {
        let mut state = TreeState::new(&RTreeConfig::default(), 0);
        insert_all(&mut state, &[point(1, 3.0, 4.0)], SplitMode::Quadratic, &EmptyMonitor);

        let root = state.root();
        assert_eq!(state.node_count(), 1);
        assert_eq!(state.leaf_of(1), Some(root));
        assert_eq!(state.envelope(root).unwrap(), Envelope::point(3.0, 4.0));
        assert!(check_tree(&state).is_valid);
    }

    #[test]
    fn test_root_split_grows_tree() {
        let config = RTreeConfig::new(4, 2).unwrap();
        let mut state = TreeState::new(&config, 0);
        let old_root = state.root();
        let monitor = RTreeMonitor::new();
        let entries: Vec<Entry> = (0..5).map(|i| point(i, i as f64, i as f64)).collect();
        insert_all(&mut state, &entries, SplitMode::Quadratic, &monitor);

        assert_eq!(monitor.split_count(), 1);
        assert_eq!(state.height().unwrap(), 2);
        assert_ne!(state.root(), old_root);
        assert_eq!(state.node(state.root()).unwrap().children().len(), 2);
        assert_eq!(state.envelope(state.root()).unwrap(), Envelope::new(0.0, 0.0, 4.0, 4.0));

        let report = check_tree(&state);
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn test_choose_subtree_prefers_containing_child() {
        let config = RTreeConfig::new(4, 2).unwrap();
        let mut state = TreeState::new(&config, 0);
        let entries = [
            point(1, 0.0, 0.0),
            point(2, 10.0, 10.0),
            point(3, 100.0, 100.0),
            point(4, 110.0, 110.0),
            point(5, 1.0, 1.0),
        ];
        insert_all(&mut state, &entries, SplitMode::Quadratic, &EmptyMonitor);

        let txn = WriteTransaction::begin(&state);
        let low = choose_leaf(&txn, &Envelope::point(5.0, 5.0)).unwrap();
        let high = choose_leaf(&txn, &Envelope::point(105.0, 105.0)).unwrap();
        assert_ne!(low, high);
        assert_eq!(state.leaf_of(1), Some(low));
        assert_eq!(state.leaf_of(3), Some(high));
    }

    #[test]
    fn test_many_inserts_keep_invariants() {
        let config = RTreeConfig::new(6, 2).unwrap();
        for mode in [SplitMode::Quadratic, SplitMode::Greene] {
            let mut state = TreeState::new(&config, 0);
            let mut rng = StdRng::seed_from_u64(42);
            let entries: Vec<Entry> = (0..300)
                .map(|i| {
                    let x = rng.gen_range(0.0..1000.0);
                    let y = rng.gen_range(0.0..1000.0);
                    Entry::new(i, Envelope::new(x, y, x + rng.gen_range(0.0..10.0), y + 1.0))
                })
                .collect();
            insert_all(&mut state, &entries, mode, &EmptyMonitor);

            let report = check_tree(&state);
            assert!(report.is_valid, "{:?}: {:?}", mode, report.errors);
            assert_eq!(report.entries_checked, 300);
            assert!(state.height().unwrap() >= 3);
        }
    }

    #[test]
    fn test_split_node_keeps_id_and_creates_sibling() {
        let config = RTreeConfig::new(4, 2).unwrap();
        let state = TreeState::new(&config, 0);
        let root = state.root();
        let mut txn = WriteTransaction::begin(&state);
        for i in 0..5 {
            txn.add_entry(root, point(i, i as f64 * 10.0, 0.0)).unwrap();
        }

        let sibling = split_node(&mut txn, root, SplitMode::Greene).unwrap();
        let kept: Vec<u64> = txn.node(root).unwrap().entries().iter().map(|e| e.object).collect();
        let moved: Vec<u64> = txn.node(sibling).unwrap().entries().iter().map(|e| e.object).collect();
        assert_eq!(kept, vec![0, 1]);
        assert_eq!(moved, vec![2, 3, 4]);
        assert_eq!(txn.leaf_of(3), Some(sibling));
        assert_eq!(txn.envelope(root).unwrap(), Envelope::new(0.0, 0.0, 10.0, 0.0));
    }
}
