//! Bridge between the tree and the externally owned indexed objects.
//!
//! The tree stores only object ids and cached envelopes. Whenever it needs
//! the envelope of an object it does not index yet, or has to destroy an
//! object it removed, it asks an [`EnvelopeDecoder`].

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::envelope::Envelope;
use crate::rtree::rtree_types::ObjectId;

/// Decodes the envelope of an indexed object.
pub trait EnvelopeDecoder: Send + Sync {
    /// The envelope of `object`, or `None` when it has no valid one.
    fn decode_envelope(&self, object: ObjectId) -> Option<Envelope>;

    /// Destroys the external object. Called only after the removal of its
    /// entry has been committed.
    fn delete_object(&self, _object: ObjectId) {}
}

/// In-memory object store holding a `[min_x, min_y, max_x, max_y]` array per
/// object.
#[derive(Debug, Default)]
pub struct BboxObjectStore {
    objects: RwLock<HashMap<ObjectId, [f64; 4]>>,
}

impl BboxObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: ObjectId, bbox: [f64; 4]) {
        self.objects.write().insert(object, bbox);
    }

    pub fn insert_point(&self, object: ObjectId, x: f64, y: f64) {
        self.insert(object, [x, y, x, y]);
    }

    pub fn remove(&self, object: ObjectId) -> Option<[f64; 4]> {
        self.objects.write().remove(&object)
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.objects.read().contains_key(&object)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl EnvelopeDecoder for BboxObjectStore {
    fn decode_envelope(&self, object: ObjectId) -> Option<Envelope> {
        self.objects
            .read()
            .get(&object)
            .and_then(|bbox| Envelope::from_array(*bbox))
    }

    fn delete_object(&self, object: ObjectId) {
        self.objects.write().remove(&object);
    }
}
