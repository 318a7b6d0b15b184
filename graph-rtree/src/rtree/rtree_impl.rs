//! RTreeIndex implementation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use super::delete::delete_entry;
use super::insert::insert_entry;
use super::integrity::{check_tree, IntegrityReport};
use super::layout::TreeLayout;
use super::node_store::{NodeReader, TreeState};
use super::rtree_config::{RTreeConfig, SplitMode};
use super::rtree_constants::DEFAULT_CONTAINER_ID;
use super::rtree_storage::LayoutStorage;
use super::rtree_types::{
    Entry, NodeBody, NodeId, ObjectId, RTreeStats, SpatialError, SpatialResult,
};
use super::search;
use super::transaction::WriteTransaction;
use crate::decoder::EnvelopeDecoder;
use crate::envelope::Envelope;
use crate::filter::{
    CoversEnvelope, IntersectsEnvelope, NearestCandidates, SearchAll, SearchFilter,
    WithinDistance, WithinEnvelope,
};
use crate::monitor::{EmptyMonitor, Listener, TreeMonitor};

/// A Guttman R-tree over externally owned objects.
///
/// Handles are cheap to clone and share one tree. Mutations run one at a
/// time, each inside its own write transaction; readers keep traversing the
/// last committed state while a mutation is staged and never see a partial
/// result.
#[derive(Clone)]
pub struct RTreeIndex {
    inner: Arc<RTreeIndexInner>,
}

struct RTreeIndexInner {
    state: RwLock<TreeState>,
    config: RTreeConfig,
    decoder: Arc<dyn EnvelopeDecoder>,
    monitor: RwLock<Arc<dyn TreeMonitor>>,
    /// Backing file, absent for in-memory trees
    storage: Option<LayoutStorage>,
    /// Committed changes not yet written to storage
    dirty: AtomicBool,
    closed: RwLock<bool>,
}

impl RTreeIndex {
    /// Create an empty tree that lives in memory only.
    pub fn in_memory(config: RTreeConfig, decoder: Arc<dyn EnvelopeDecoder>) -> SpatialResult<Self> {
        config.validate()?;
        let state = TreeState::new(&config, DEFAULT_CONTAINER_ID);
        Ok(Self::from_parts(state, config, decoder, None))
    }

    /// Create an empty tree backed by a new file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        config: RTreeConfig,
        decoder: Arc<dyn EnvelopeDecoder>,
    ) -> SpatialResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        log::debug!("Creating new R-tree at {:?}", path);

        let storage = LayoutStorage::create(path)?;
        let state = TreeState::new(&config, DEFAULT_CONTAINER_ID);
        storage.write_layout(&TreeLayout::from_state(&state)?)?;
        storage.sync()?;
        Ok(Self::from_parts(state, config, decoder, Some(storage)))
    }

    /// Open the tree persisted at `path`.
    ///
    /// The fanout bounds recorded in the file take precedence over the ones
    /// in `config`; only the split mode is taken from `config`.
    pub fn open(
        path: impl AsRef<Path>,
        config: RTreeConfig,
        decoder: Arc<dyn EnvelopeDecoder>,
    ) -> SpatialResult<Self> {
        let path = path.as_ref();
        log::debug!("Opening existing R-tree at {:?}", path);

        let storage = LayoutStorage::open(path)?;
        let layout = storage.read_layout()?;
        let state = layout.into_state(decoder.as_ref())?;

        let metadata = state.metadata();
        let effective = RTreeConfig::new(metadata.max_node_references, metadata.min_node_references)?
            .with_split_mode(config.split_mode());
        if effective.max_node_references() != config.max_node_references()
            || effective.min_node_references() != config.min_node_references()
        {
            log::debug!(
                "Using stored fanout {}/{} instead of configured {}/{}",
                effective.max_node_references(),
                effective.min_node_references(),
                config.max_node_references(),
                config.min_node_references()
            );
        }
        Ok(Self::from_parts(state, effective, decoder, Some(storage)))
    }

    fn from_parts(
        state: TreeState,
        config: RTreeConfig,
        decoder: Arc<dyn EnvelopeDecoder>,
        storage: Option<LayoutStorage>,
    ) -> Self {
        Self {
            inner: Arc::new(RTreeIndexInner {
                state: RwLock::new(state),
                config,
                decoder,
                monitor: RwLock::new(Arc::new(EmptyMonitor)),
                storage,
                dirty: AtomicBool::new(false),
                closed: RwLock::new(false),
            }),
        }
    }

    /// Check if tree is closed
    fn check_closed(&self) -> SpatialResult<()> {
        if *self.inner.closed.read() {
            Err(SpatialError::Closed)
        } else {
            Ok(())
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> RTreeConfig {
        self.inner.config
    }

    pub fn monitor(&self) -> Arc<dyn TreeMonitor> {
        self.inner.monitor.read().clone()
    }

    pub fn set_monitor(&self, monitor: Arc<dyn TreeMonitor>) {
        *self.inner.monitor.write() = monitor;
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Runs `mutation` inside one write transaction and commits its result.
    ///
    /// Writers are serialised by the upgradable lock while readers continue
    /// on the committed state. Any error drops the transaction, which
    /// discards everything it staged.
    fn write<T>(
        &self,
        mutation: impl FnOnce(&mut WriteTransaction<'_>, &dyn TreeMonitor) -> SpatialResult<T>,
    ) -> SpatialResult<T> {
        self.check_closed()?;
        let monitor = self.monitor();
        let guard = self.inner.state.upgradable_read();

        let (value, changes) = {
            let mut txn = WriteTransaction::begin(&guard);
            let value = mutation(&mut txn, monitor.as_ref())?;
            (value, txn.into_changes())
        };

        let mut state = RwLockUpgradableReadGuard::upgrade(guard);
        if !changes.is_noop() || changes.metadata != state.metadata {
            self.inner.dirty.store(true, Ordering::Release);
        }
        state.apply(changes);
        monitor.set_height(state.height()?);
        Ok(value)
    }

    /// Index `object` under the envelope the decoder reports for it.
    pub fn insert(&self, object: ObjectId) -> SpatialResult<()> {
        let decoder = self.inner.decoder.clone();
        let split_mode = self.inner.config.split_mode();
        self.write(|txn, monitor| {
            let envelope = decode(decoder.as_ref(), object)?;
            insert_counted(txn, Entry::new(object, envelope), split_mode, monitor)
        })
    }

    /// Index an entry whose envelope is already known.
    pub fn insert_entry(&self, entry: Entry) -> SpatialResult<()> {
        let usable = entry
            .envelope
            .to_array()
            .and_then(Envelope::from_array)
            .is_some();
        if !usable {
            return Err(SpatialError::InvalidOperation(format!(
                "cannot index object {} under an empty or NaN envelope",
                entry.object
            )));
        }
        let split_mode = self.inner.config.split_mode();
        self.write(|txn, monitor| insert_counted(txn, entry, split_mode, monitor))
    }

    /// Index a batch of objects in a single transaction; either all of them
    /// are indexed or none is.
    pub fn insert_all(&self, objects: &[ObjectId], listener: &mut dyn Listener) -> SpatialResult<()> {
        let decoder = self.inner.decoder.clone();
        let split_mode = self.inner.config.split_mode();
        listener.begin(objects.len());
        self.write(|txn, monitor| {
            for object in objects {
                let envelope = decode(decoder.as_ref(), *object)?;
                insert_counted(txn, Entry::new(*object, envelope), split_mode, monitor)?;
                listener.worked(1);
            }
            Ok(())
        })?;
        listener.done();
        Ok(())
    }

    /// Re-index `object` under its current envelope.
    pub fn update(&self, object: ObjectId) -> SpatialResult<()> {
        let decoder = self.inner.decoder.clone();
        let split_mode = self.inner.config.split_mode();
        self.write(|txn, monitor| {
            delete_entry(txn, object, split_mode, monitor)?;
            let envelope = decode(decoder.as_ref(), object)?;
            insert_entry(txn, Entry::new(object, envelope), split_mode, monitor)
        })
    }

    /// Remove `object` from the tree. With `delete_object` the decoder is
    /// asked to destroy the object once the removal has been committed.
    pub fn delete(&self, object: ObjectId, delete_object: bool) -> SpatialResult<Entry> {
        let split_mode = self.inner.config.split_mode();
        let entry = self.write(|txn, monitor| {
            let entry = delete_entry(txn, object, split_mode, monitor)?;
            let metadata = txn.metadata_mut();
            if metadata.total_count > 0 {
                metadata.total_count -= 1;
            }
            Ok(entry)
        })?;
        if delete_object {
            self.inner.decoder.delete_object(object);
        }
        Ok(entry)
    }

    /// Remove every entry and every node, leaving a fresh empty root.
    pub fn remove_all(&self, delete_objects: bool, listener: &mut dyn Listener) -> SpatialResult<()> {
        let objects = self.write(|txn, monitor| {
            let mut objects = Vec::new();
            search::traverse(&*txn, &SearchAll, monitor, &mut |entry: &Entry| {
                objects.push(entry.object)
            })?;
            listener.begin(objects.len());

            for id in txn.breadth_first()? {
                txn.destroy_node(id)?;
            }
            for object in &objects {
                txn.forget_reference(*object);
                listener.worked(1);
            }
            let root = txn.create_node(NodeBody::Leaf(Vec::new()));
            txn.set_root(root)?;
            txn.metadata_mut().total_count = 0;
            Ok(objects)
        })?;
        log::debug!("Removed all {} entries from the R-tree", objects.len());

        if delete_objects {
            for object in &objects {
                self.inner.decoder.delete_object(*object);
            }
        }
        listener.done();
        Ok(())
    }

    /// Remove every entry without touching the indexed objects.
    pub fn clear(&self) -> SpatialResult<()> {
        self.remove_all(false, &mut crate::monitor::NullListener)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Report every entry accepted by `filter` to `on_match`.
    pub fn traverse(&self, filter: &dyn SearchFilter, on_match: &mut dyn FnMut(&Entry)) -> SpatialResult<()> {
        self.check_closed()?;
        let monitor = self.monitor();
        let state = self.inner.state.read();
        search::traverse(&*state, filter, monitor.as_ref(), on_match)
    }

    pub fn search(&self, filter: &dyn SearchFilter) -> SpatialResult<Vec<ObjectId>> {
        let mut found = Vec::new();
        self.traverse(filter, &mut |entry: &Entry| found.push(entry.object))?;
        Ok(found)
    }

    /// Objects whose envelope intersects `window`.
    pub fn find_intersecting(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>> {
        self.search(&IntersectsEnvelope(*window))
    }

    /// Objects whose envelope lies inside `window`.
    pub fn find_contained(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>> {
        self.search(&WithinEnvelope(*window))
    }

    /// Objects whose envelope contains `window`.
    pub fn find_covering(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>> {
        self.search(&CoversEnvelope(*window))
    }

    /// The `k` objects closest to `(x, y)`, nearest first.
    pub fn find_nearest(
        &self,
        x: f64,
        y: f64,
        k: usize,
        max_distance: Option<f64>,
    ) -> SpatialResult<Vec<(ObjectId, f64)>> {
        let filter = NearestCandidates::new(x, y, k, max_distance.unwrap_or(f64::INFINITY));
        self.traverse(&filter, &mut |_: &Entry| {})?;
        Ok(filter.into_results())
    }

    /// Objects within `distance` of `(x, y)`, nearest first.
    pub fn find_within_distance(&self, x: f64, y: f64, distance: f64) -> SpatialResult<Vec<(ObjectId, f64)>> {
        let mut found = Vec::new();
        self.traverse(&WithinDistance::new(x, y, distance), &mut |entry: &Entry| {
            found.push((entry.object, entry.envelope.distance_to_point(x, y)))
        })?;
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(found)
    }

    pub fn all_indexed_objects(&self) -> SpatialResult<Vec<ObjectId>> {
        self.search(&SearchAll)
    }

    /// Every node id, breadth-first from the root.
    pub fn all_index_nodes(&self) -> SpatialResult<Vec<NodeId>> {
        self.check_closed()?;
        self.inner.state.read().breadth_first()
    }

    pub fn is_empty(&self) -> SpatialResult<bool> {
        self.check_closed()?;
        self.inner.state.read().is_empty()
    }

    /// Whether a leaf of this tree references `object`.
    pub fn is_indexed(&self, object: ObjectId) -> SpatialResult<bool> {
        self.check_closed()?;
        let state = self.inner.state.read();
        match state.leaf_of(object) {
            Some(leaf) => Ok(state.top_of(leaf, state.node_count())? == state.root()),
            None => Ok(false),
        }
    }

    /// The envelope of the whole tree, `None` when it is empty.
    pub fn bounding_box(&self) -> SpatialResult<Option<Envelope>> {
        self.check_closed()?;
        let state = self.inner.state.read();
        let envelope = state.envelope(state.root())?;
        Ok(if envelope.is_empty() { None } else { Some(envelope) })
    }

    /// Number of indexed entries.
    ///
    /// Served from the cached total. A zero total on a non-empty tree is
    /// not trusted: the entries are counted by a full traversal and the
    /// result is cached again.
    pub fn count(&self) -> SpatialResult<u64> {
        self.check_closed()?;
        {
            let state = self.inner.state.read();
            let cached = state.metadata().total_count;
            if cached > 0 || state.is_empty()? {
                return Ok(cached);
            }
        }

        let monitor = self.monitor();
        let guard = self.inner.state.upgradable_read();
        if guard.metadata().total_count > 0 {
            return Ok(guard.metadata().total_count);
        }
        log::warn!("Cached entry count is not trusted, counting entries");
        let mut counted = 0u64;
        search::traverse(&*guard, &SearchAll, monitor.as_ref(), &mut |_: &Entry| counted += 1)?;

        let mut state = RwLockUpgradableReadGuard::upgrade(guard);
        state.metadata.total_count = counted;
        self.inner.dirty.store(true, Ordering::Release);
        Ok(counted)
    }

    /// Traverse the whole tree once without reporting anything.
    pub fn warm_up(&self) -> SpatialResult<()> {
        self.traverse(&SearchAll, &mut |_: &Entry| {})
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Get comprehensive statistics
    pub fn stats(&self) -> SpatialResult<RTreeStats> {
        self.check_closed()?;
        let state = self.inner.state.read();
        let leaf_count = state.nodes.values().filter(|node| node.is_leaf()).count();

        Ok(RTreeStats {
            total_entries: state.references.len() as u64,
            node_count: state.node_count() as u64,
            leaf_count: leaf_count as u64,
            tree_height: state.height()?,
            split_count: self.monitor().split_count(),
        })
    }

    /// Verify the structural invariants of the committed tree.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        self.check_closed()?;
        Ok(check_tree(&self.inner.state.read()))
    }

    /// The persisted layout of the committed tree.
    pub fn to_layout(&self) -> SpatialResult<TreeLayout> {
        self.check_closed()?;
        TreeLayout::from_state(&self.inner.state.read())
    }

    /// Write committed changes to the backing file, if any.
    pub fn flush(&self) -> SpatialResult<()> {
        self.check_closed()?;
        self.inner.flush()
    }

    /// Flush and close. Every later call fails with [`SpatialError::Closed`].
    pub fn close(&self) -> SpatialResult<()> {
        self.check_closed()?;
        self.inner.flush()?;
        *self.inner.closed.write() = true;
        Ok(())
    }

    /// Close the tree and delete its backing file without flushing.
    pub fn drop_index(&self) -> SpatialResult<()> {
        let mut closed = self.inner.closed.write();
        if *closed {
            return Err(SpatialError::Closed);
        }
        {
            let mut state = self.inner.state.write();
            let container = state.container();
            *state = TreeState::new(&self.inner.config, container);
        }
        if let Some(storage) = &self.inner.storage {
            storage.delete()?;
        }
        *closed = true;
        log::debug!("Dropped R-tree");
        Ok(())
    }
}

impl RTreeIndexInner {
    fn flush(&self) -> SpatialResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let layout = TreeLayout::from_state(&self.state.read());
        let written = layout.and_then(|layout| {
            storage.write_layout(&layout)?;
            storage.sync()
        });
        match &written {
            Ok(()) => log::debug!("Flushed R-tree to {:?}", storage.path()),
            Err(_) => self.dirty.store(true, Ordering::Release),
        }
        written
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn decode(decoder: &dyn EnvelopeDecoder, object: ObjectId) -> SpatialResult<Envelope> {
    decoder
        .decode_envelope(object)
        .ok_or(SpatialError::UndecodableObject(object))
}

/// Inserts a new entry and keeps the cached count when it is trusted.
fn insert_counted(
    txn: &mut WriteTransaction<'_>,
    entry: Entry,
    split_mode: SplitMode,
    monitor: &dyn TreeMonitor,
) -> SpatialResult<()> {
    if txn.leaf_of(entry.object).is_some() {
        return Err(SpatialError::AlreadyIndexed(entry.object));
    }
    let was_empty = txn.node(txn.root())?.is_empty();
    insert_entry(txn, entry, split_mode, monitor)?;

    let metadata = txn.metadata_mut();
    if metadata.total_count > 0 || was_empty {
        metadata.total_count += 1;
    }
    Ok(())
}

// ============================================================================
// Drop Implementation
// ============================================================================

impl Drop for RTreeIndexInner {
    fn drop(&mut self) {
        // Best effort flush on drop
        if !*self.closed.read() {
            if let Err(e) = self.flush() {
                log::warn!("Failed to flush R-tree on drop: {}", e);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::BboxObjectStore;
    use crate::monitor::{NullListener, RTreeMonitor};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    fn store_with_points(count: u64) -> Arc<BboxObjectStore> {
        let store = Arc::new(BboxObjectStore::new());
        for object in 0..count {
            store.insert_point(object, (object % 10) as f64, (object / 10) as f64);
        }
        store
    }

    fn small_config() -> RTreeConfig {
        RTreeConfig::new(4, 2).unwrap()
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_create_empty_index() {
        let tree = RTreeIndex::in_memory(RTreeConfig::default(), store_with_points(0)).unwrap();
        assert_eq!(tree.count().unwrap(), 0);
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.bounding_box().unwrap(), None);
        assert_eq!(tree.all_index_nodes().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            RTreeConfig::new(10, 10),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        let config = RTreeConfig::from_json(r#"{"maxNodeReferences": 4, "minNodeReferences": 3}"#);
        assert!(config.is_err());
    }

    #[test]
    fn test_index_api() {
        let store = Arc::new(BboxObjectStore::new());
        store.insert(1, [0.0, 0.0, 10.0, 10.0]);
        store.insert(2, [5.0, 5.0, 15.0, 15.0]);
        store.insert(3, [20.0, 20.0, 30.0, 30.0]);
        let tree = RTreeIndex::in_memory(small_config(), store.clone()).unwrap();

        tree.insert(1).unwrap();
        tree.insert(2).unwrap();
        tree.insert(3).unwrap();
        assert_eq!(tree.count().unwrap(), 3);

        let mut results = tree
            .find_intersecting(&Envelope::new(8.0, 8.0, 12.0, 12.0))
            .unwrap();
        results.sort_unstable();
        assert_eq!(results, vec![1, 2]);

        let results = tree
            .find_contained(&Envelope::new(-1.0, -1.0, 11.0, 11.0))
            .unwrap();
        assert_eq!(results, vec![1]);

        let results = tree.find_covering(&Envelope::point(9.0, 9.0)).unwrap();
        assert_eq!(results.len(), 2);

        tree.delete(1, true).unwrap();
        assert_eq!(tree.count().unwrap(), 2);
        assert!(!store.contains(1));
        assert!(!tree.is_indexed(1).unwrap());
        assert!(tree.is_indexed(2).unwrap());

        tree.clear().unwrap();
        assert_eq!(tree.count().unwrap(), 0);
        assert!(store.contains(2));
        tree.close().unwrap();
    }

    #[test]
    fn test_insert_errors() {
        let store = store_with_points(3);
        store.insert(99, [1.0, 1.0, 0.0, 0.0]);
        let tree = RTreeIndex::in_memory(small_config(), store).unwrap();

        tree.insert(0).unwrap();
        assert!(matches!(tree.insert(0), Err(SpatialError::AlreadyIndexed(0))));
        assert!(matches!(tree.insert(99), Err(SpatialError::UndecodableObject(99))));
        assert!(matches!(tree.insert(1234), Err(SpatialError::UndecodableObject(1234))));
        assert!(matches!(
            tree.insert_entry(Entry::new(5, Envelope::empty())),
            Err(SpatialError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.insert_entry(Entry::new(6, Envelope::new(f64::NAN, 0.0, 1.0, 1.0))),
            Err(SpatialError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.insert_entry(Entry::new(7, Envelope::new(0.0, 0.0, 1.0, f64::NAN))),
            Err(SpatialError::InvalidOperation(_))
        ));
        assert!(!tree.is_indexed(6).unwrap());
        assert!(!tree.is_indexed(7).unwrap());
        assert!(matches!(tree.delete(2, false), Err(SpatialError::NotIndexed(2))));
        assert_eq!(tree.count().unwrap(), 1);
    }

    #[test]
    fn test_root_split_with_default_fanout() {
        let tree = RTreeIndex::in_memory(RTreeConfig::default(), store_with_points(101)).unwrap();
        for object in 0..101 {
            tree.insert(object).unwrap();
        }

        let root_children = {
            let layout = tree.to_layout().unwrap();
            let root = layout.links[0].to;
            layout
                .links
                .iter()
                .filter(|link| link.from == root)
                .count()
        };
        assert!(root_children >= 2);
        assert_eq!(tree.count().unwrap(), 101);
        assert_eq!(tree.stats().unwrap().tree_height, 2);
    }

    #[test]
    fn test_delete_without_reorganization() {
        let tree = RTreeIndex::in_memory(RTreeConfig::default(), store_with_points(50)).unwrap();
        let monitor = Arc::new(RTreeMonitor::new());
        tree.set_monitor(monitor.clone());
        for object in 0..50 {
            tree.insert(object).unwrap();
        }
        let nodes_before = tree.all_index_nodes().unwrap();

        tree.delete(17, false).unwrap();
        assert_eq!(tree.count().unwrap(), 49);
        assert_eq!(tree.all_index_nodes().unwrap(), nodes_before);
        assert_eq!(monitor.rebuilt_count(), 0);
    }

    #[test]
    fn test_insert_all_rolls_back_on_error() {
        let store = store_with_points(20);
        let tree = RTreeIndex::in_memory(small_config(), store).unwrap();
        tree.insert_all(&[0, 1, 2], &mut NullListener).unwrap();
        let layout_before = tree.to_layout().unwrap();

        let batch: Vec<ObjectId> = (3..20).chain([500]).collect();
        assert!(matches!(
            tree.insert_all(&batch, &mut NullListener),
            Err(SpatialError::UndecodableObject(500))
        ));

        assert_eq!(tree.count().unwrap(), 3);
        assert!(!tree.is_indexed(3).unwrap());
        assert_eq!(tree.to_layout().unwrap(), layout_before);
        assert!(tree.check_integrity().unwrap().is_valid);
    }

    #[test]
    fn test_update_moves_entry() {
        let store = store_with_points(10);
        let tree = RTreeIndex::in_memory(small_config(), store.clone()).unwrap();
        tree.insert_all(&(0..10).collect::<Vec<_>>(), &mut NullListener).unwrap();

        store.insert_point(4, 500.0, 500.0);
        tree.update(4).unwrap();
        assert_eq!(tree.find_intersecting(&Envelope::point(500.0, 500.0)).unwrap(), vec![4]);
        assert!(tree.find_intersecting(&Envelope::point(4.0, 0.0)).unwrap().is_empty());
        assert_eq!(tree.count().unwrap(), 10);
        assert!(matches!(tree.update(77), Err(SpatialError::NotIndexed(77))));
    }

    #[test]
    fn test_remove_all_deletes_objects() {
        let store = store_with_points(100);
        let tree = RTreeIndex::in_memory(small_config(), store.clone()).unwrap();
        tree.insert_all(&(0..100).collect::<Vec<_>>(), &mut NullListener).unwrap();
        let old_nodes = tree.all_index_nodes().unwrap();

        tree.remove_all(true, &mut NullListener).unwrap();
        assert_eq!(tree.count().unwrap(), 0);
        assert!(store.is_empty());

        let nodes = tree.all_index_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(!old_nodes.contains(&nodes[0]));
        assert!(tree.check_integrity().unwrap().is_valid);
    }

    #[test]
    fn test_nearest_and_within_distance() {
        let tree = RTreeIndex::in_memory(small_config(), store_with_points(100)).unwrap();
        tree.insert_all(&(0..100).collect::<Vec<_>>(), &mut NullListener).unwrap();

        let nearest = tree.find_nearest(3.1, 4.0, 3, None).unwrap();
        let objects: Vec<ObjectId> = nearest.iter().map(|(o, _)| *o).collect();
        assert_eq!(objects[0], 43);
        assert_eq!(nearest.len(), 3);
        assert!(nearest.windows(2).all(|w| w[0].1 <= w[1].1));

        assert!(tree.find_nearest(3.1, 4.0, 3, Some(0.01)).unwrap().is_empty());

        let within = tree.find_within_distance(0.0, 0.0, 1.0).unwrap();
        let objects: Vec<ObjectId> = within.iter().map(|(o, _)| *o).collect();
        assert_eq!(objects, vec![0, 1, 10]);
    }

    #[test]
    fn test_untrusted_count_is_recounted() {
        init_logging();
        let tree = RTreeIndex::in_memory(small_config(), store_with_points(30)).unwrap();
        tree.insert_all(&(0..30).collect::<Vec<_>>(), &mut NullListener).unwrap();
        tree.inner.state.write().metadata.total_count = 0;

        assert_eq!(tree.count().unwrap(), 30);
        assert_eq!(tree.inner.state.read().metadata().total_count, 30);
    }

    #[test]
    fn test_persistence_round_trip() {
        init_logging();
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let store = store_with_points(60);

        let layout = {
            let tree = RTreeIndex::create(&path, small_config(), store.clone()).unwrap();
            tree.insert_all(&(0..60).collect::<Vec<_>>(), &mut NullListener).unwrap();
            tree.delete(7, false).unwrap();
            let layout = tree.to_layout().unwrap();
            tree.close().unwrap();
            layout
        };

        let config = RTreeConfig::default().with_split_mode(SplitMode::Greene);
        let tree = RTreeIndex::open(&path, config, store).unwrap();
        assert_eq!(tree.to_layout().unwrap(), layout);
        assert_eq!(tree.count().unwrap(), 59);
        assert_eq!(tree.config().max_node_references(), 4);
        assert_eq!(tree.config().split_mode(), SplitMode::Greene);
        assert!(tree.check_integrity().unwrap().is_valid);
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let store = store_with_points(10);
        {
            let tree = RTreeIndex::create(&path, small_config(), store.clone()).unwrap();
            tree.insert_all(&(0..10).collect::<Vec<_>>(), &mut NullListener).unwrap();
        }
        let tree = RTreeIndex::open(&path, small_config(), store).unwrap();
        assert_eq!(tree.count().unwrap(), 10);
    }

    #[test]
    fn test_closed_tree_rejects_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let tree = RTreeIndex::create(&path, small_config(), store_with_points(5)).unwrap();
        tree.close().unwrap();

        assert!(matches!(tree.insert(1), Err(SpatialError::Closed)));
        assert!(matches!(tree.count(), Err(SpatialError::Closed)));
        assert!(matches!(tree.close(), Err(SpatialError::Closed)));
    }

    #[test]
    fn test_drop_index_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let tree = RTreeIndex::create(&path, small_config(), store_with_points(5)).unwrap();
        tree.insert(1).unwrap();
        tree.drop_index().unwrap();
        assert!(!path.exists());
        assert!(matches!(tree.find_intersecting(&Envelope::point(1.0, 0.0)), Err(SpatialError::Closed)));
    }

    #[test]
    fn test_random_operations_keep_invariants() {
        init_logging();
        let mut rng = StdRng::seed_from_u64(2024);
        let store = Arc::new(BboxObjectStore::new());
        for object in 0..400 {
            let x = rng.gen_range(-180.0..180.0);
            let y = rng.gen_range(-90.0..90.0);
            store.insert(object, [x, y, x + rng.gen_range(0.0..2.0), y + rng.gen_range(0.0..2.0)]);
        }
        let config = RTreeConfig::new(8, 3).unwrap();
        let tree = RTreeIndex::in_memory(config, store).unwrap();

        let mut indexed = Vec::new();
        for step in 0..1200 {
            if indexed.is_empty() || rng.gen_bool(0.6) {
                let object = rng.gen_range(0..400u64);
                if !indexed.contains(&object) {
                    tree.insert(object).unwrap();
                    indexed.push(object);
                }
            } else {
                let position = rng.gen_range(0..indexed.len());
                let object = indexed.swap_remove(position);
                tree.delete(object, false).unwrap();
            }
            if step % 100 == 0 {
                let report = tree.check_integrity().unwrap();
                assert!(report.is_valid, "step {}: {:?}", step, report.errors);
            }
        }

        assert_eq!(tree.count().unwrap(), indexed.len() as u64);
        let mut all = tree.all_indexed_objects().unwrap();
        all.sort_unstable();
        indexed.sort_unstable();
        assert_eq!(all, indexed);
    }
}
