//! SpatialIndex trait definition for object-keyed spatial indexing.

use crate::envelope::Envelope;
use crate::rtree::{ObjectId, RTreeIndex, SpatialError, SpatialResult};

/// Key-level view of a spatial index.
///
/// Objects are identified by id only; their envelopes come from the
/// decoder the index was built with.
pub trait SpatialIndex: Send + Sync {
    /// Adds an object to the index.
    fn add(&self, object: ObjectId) -> SpatialResult<()>;

    /// Removes an object from the index. Returns `false` when it was not
    /// indexed.
    fn remove(&self, object: ObjectId) -> SpatialResult<bool>;

    /// Finds the objects intersecting the window.
    fn find_intersecting_keys(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>>;

    /// Finds the objects contained in the window.
    fn find_contained_keys(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>>;

    /// Finds the K nearest objects to a point using branch-and-bound search.
    fn find_nearest(
        &self,
        center_x: f64,
        center_y: f64,
        k: usize,
        max_distance: Option<f64>,
    ) -> SpatialResult<Vec<(ObjectId, f64)>>;

    /// Finds objects within a specific distance of a point.
    fn find_within_distance(
        &self,
        center_x: f64,
        center_y: f64,
        distance: f64,
    ) -> SpatialResult<Vec<(ObjectId, f64)>> {
        self.find_nearest(center_x, center_y, usize::MAX, Some(distance))
    }

    /// Gets the number of indexed objects.
    ///
    /// A failed count (closed or corrupt index) is logged and reads as 0;
    /// callers that must tell the two apart should use `RTreeIndex::count`.
    fn size(&self) -> u64;

    /// Closes the index, flushing all pending changes.
    fn close(&self) -> SpatialResult<()>;

    /// Removes every object from the index.
    fn clear(&self) -> SpatialResult<()>;

    /// Drops the index, removing all data.
    fn drop_index(&self) -> SpatialResult<()>;
}

impl SpatialIndex for RTreeIndex {
    fn add(&self, object: ObjectId) -> SpatialResult<()> {
        self.insert(object)
    }

    fn remove(&self, object: ObjectId) -> SpatialResult<bool> {
        match self.delete(object, false) {
            Ok(_) => Ok(true),
            Err(SpatialError::NotIndexed(_)) | Err(SpatialError::NotIndexedInThisTree(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn find_intersecting_keys(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>> {
        self.find_intersecting(window)
    }

    fn find_contained_keys(&self, window: &Envelope) -> SpatialResult<Vec<ObjectId>> {
        self.find_contained(window)
    }

    fn find_nearest(
        &self,
        center_x: f64,
        center_y: f64,
        k: usize,
        max_distance: Option<f64>,
    ) -> SpatialResult<Vec<(ObjectId, f64)>> {
        RTreeIndex::find_nearest(self, center_x, center_y, k, max_distance)
    }

    fn find_within_distance(
        &self,
        center_x: f64,
        center_y: f64,
        distance: f64,
    ) -> SpatialResult<Vec<(ObjectId, f64)>> {
        RTreeIndex::find_within_distance(self, center_x, center_y, distance)
    }

    fn size(&self) -> u64 {
        match self.count() {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Failed to count R-tree entries: {}", e);
                0
            }
        }
    }

    fn close(&self) -> SpatialResult<()> {
        RTreeIndex::close(self)
    }

    fn clear(&self) -> SpatialResult<()> {
        RTreeIndex::clear(self)
    }

    fn drop_index(&self) -> SpatialResult<()> {
        RTreeIndex::drop_index(self)
    }
}
