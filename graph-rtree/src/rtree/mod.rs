//! Guttman R-Tree over externally owned objects.
//!
//! The tree lives in an arena of nodes keyed by id, with parent back-links
//! and an inbound reference map from every indexed object to its leaf:
//! - Insertion descends by least enlargement and splits overflowing nodes
//!   with the quadratic or Greene heuristic
//! - Deletion condenses underfull nodes and re-inserts their orphaned entries
//! - Searches are driven by pluggable filters that prune whole subtrees
//! - Every mutation is staged in a write transaction and committed in one
//!   step, so readers never observe a half-finished change
//! - A tree can be persisted as a layout of node records and typed links

pub mod rtree_types;
pub mod rtree_constants;
pub mod rtree_config;
pub mod rtree_storage;
pub mod node_store;
pub mod transaction;
pub mod layout;
pub mod integrity;
mod split;
mod insert;
mod delete;
mod search;
mod rtree_impl;

pub use rtree_types::{
    Entry, FileHeader, IndexNode, NodeBody, NodeId, ObjectId, RTreeStats, RecordId,
    SpatialError, SpatialResult, TreeMetadata,
};
pub use rtree_constants::{DEFAULT_MAX_NODE_REFERENCES, DEFAULT_MIN_NODE_REFERENCES};
pub use rtree_config::{RTreeConfig, SplitMode};
pub use rtree_storage::LayoutStorage;
pub use node_store::{NodeReader, TreeState};
pub use transaction::WriteTransaction;
pub use layout::{Link, LinkKind, MetadataRecord, NodeRecord, TreeLayout};
pub use integrity::IntegrityReport;
pub use rtree_impl::RTreeIndex;
