//! # Graph R-Tree - 2D Spatial Indexing over Stored Objects
//!
//! This crate provides a Guttman R-tree that indexes externally owned
//! objects by their 2D bounding envelopes and answers filter-driven spatial
//! queries over them.
//!
//! ## Features
//!
//! - **Classic Guttman Algorithms**: least-enlargement insertion, quadratic
//!   or Greene node splits, condense-and-reinsert deletion
//! - **Filter-Driven Search**: range, containment, covering, distance and
//!   k-nearest queries that prune whole subtrees
//! - **Transactional Writes**: every mutation commits atomically or not at all
//! - **Thread Safe**: concurrent readers alongside a single writer
//! - **Persistent**: trees are stored as node records linked by ROOT, CHILD,
//!   REFERENCE and METADATA links
//! - **Integrity Checking**: structural invariants can be verified at any time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graph_rtree::{BboxObjectStore, Envelope, RTreeConfig, RTreeIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(BboxObjectStore::new());
//! store.insert(1, [0.0, 0.0, 10.0, 10.0]);
//! store.insert_point(2, 20.0, 20.0);
//!
//! let tree = RTreeIndex::create("places.rtree", RTreeConfig::default(), store)?;
//! tree.insert(1)?;
//! tree.insert(2)?;
//!
//! let results = tree.find_intersecting(&Envelope::new(5.0, 5.0, 15.0, 15.0))?;
//! assert_eq!(results, vec![1]);
//! tree.close()?;
//! # Ok(())
//! # }
//! ```

// Core R-Tree modules
pub mod envelope;
pub mod rtree;
pub mod spatial_index;

// Query and integration modules
pub mod decoder;
pub mod filter;
pub mod monitor;

// Re-export R-Tree types
pub use envelope::Envelope;
pub use rtree::{
    Entry, IntegrityReport, NodeId, ObjectId, RTreeConfig, RTreeIndex, RTreeStats,
    SpatialError, SpatialResult, SplitMode, TreeLayout,
};
pub use spatial_index::SpatialIndex;

// Re-export query types
pub use decoder::{BboxObjectStore, EnvelopeDecoder};
pub use filter::{
    CoversEnvelope, IntersectsEnvelope, NearestCandidates, SearchAll, SearchFilter,
    VisitDecision, WithinDistance, WithinEnvelope,
};
pub use monitor::{
    EmptyMonitor, Listener, NullListener, ProgressLoggingListener, RTreeMonitor, TreeMonitor,
};
