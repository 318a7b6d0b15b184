//! Core types and data structures for the R-Tree.
//!
//! This module defines the fundamental types used throughout the R-Tree:
//! - Error types and result types
//! - Entries and index nodes of the arena
//! - Tree metadata and statistics
//! - File header and checksummed payload for the persisted layout

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use super::rtree_constants::{MAGIC, VERSION};
use crate::envelope::Envelope;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Object {0} is not indexed with an R-tree")]
    NotIndexed(ObjectId),

    #[error("Object {0} is not indexed in this R-tree")]
    NotIndexedInThisTree(ObjectId),

    #[error("Object {0} is already indexed in this R-tree")]
    AlreadyIndexed(ObjectId),

    #[error("No envelope can be decoded for object {0}")]
    UndecodableObject(ObjectId),

    #[error("R-tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Tree is closed")]
    Closed,
}

impl From<serde_json::Error> for SpatialError {
    fn from(err: serde_json::Error) -> Self {
        SpatialError::Serialization(err.to_string())
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Identifier of an index node record in the arena
pub type NodeId = u64;

/// Identifier of an externally owned indexed object
pub type ObjectId = u64;

/// Identifier of any persisted record (container, metadata, node, object)
pub type RecordId = u64;

// ============================================================================
// Node Types
// ============================================================================

/// A reference to an indexed object together with its cached envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub object: ObjectId,
    pub envelope: Envelope,
}

impl Entry {
    pub fn new(object: ObjectId, envelope: Envelope) -> Self {
        Self { object, envelope }
    }
}

/// What a node holds. An empty root is an empty leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    /// Ordered child node ids; each child carries its own envelope
    Branch(Vec<NodeId>),
    /// Ordered entries
    Leaf(Vec<Entry>),
}

/// A node of the tree arena.
///
/// The parent link is stored as a field so that walking up from a leaf is
/// O(1) per level.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexNode {
    pub envelope: Envelope,
    pub parent: Option<NodeId>,
    pub body: NodeBody,
}

impl IndexNode {
    pub fn empty_leaf() -> Self {
        Self {
            envelope: Envelope::empty(),
            parent: None,
            body: NodeBody::Leaf(Vec::new()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match &self.body {
            NodeBody::Branch(children) => children.len(),
            NodeBody::Leaf(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.body {
            NodeBody::Branch(children) => children,
            NodeBody::Leaf(_) => &[],
        }
    }

    pub fn entries(&self) -> &[Entry] {
        match &self.body {
            NodeBody::Branch(_) => &[],
            NodeBody::Leaf(entries) => entries,
        }
    }
}

/// Tree-wide metadata, persisted as the METADATA record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub max_node_references: usize,
    pub min_node_references: usize,
    /// Cached total entry count; 0 means "not trusted" for a non-empty tree
    pub total_count: u64,
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics about the R-Tree shape and operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub node_count: u64,
    pub leaf_count: u64,
    pub tree_height: u32,
    pub split_count: u64,
}

// ============================================================================
// File Header
// ============================================================================

/// File header stored at the beginning of a persisted layout file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    /// Length in bytes of the payload following the header
    pub payload_len: u64,
    /// CRC32 of the payload bytes
    pub checksum: u32,
}

impl FileHeader {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            payload_len: payload.len() as u64,
            checksum: crc32(payload),
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::InvalidOperation(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(SpatialError::InvalidOperation(
                "Unsupported file format version".into(),
            ));
        }
        Ok(())
    }

    /// Verify that `payload` is the one this header was written for
    pub fn verify(&self, payload: &[u8]) -> SpatialResult<()> {
        let actual = crc32(payload);
        if payload.len() as u64 != self.payload_len || actual != self.checksum {
            return Err(SpatialError::InvalidOperation(format!(
                "Layout checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                self.checksum, actual
            )));
        }
        Ok(())
    }
}

/// CRC32-MPEG2
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}
