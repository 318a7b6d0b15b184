//! Constants for the R-Tree implementation.

/// Default maximum number of children/entries per node
pub const DEFAULT_MAX_NODE_REFERENCES: usize = 100;

/// Default minimum number of children/entries per non-root node (40% of max)
pub const DEFAULT_MIN_NODE_REFERENCES: usize = 40;

/// Upper bound accepted for `max_node_references`
pub const MAX_MAX_NODE_REFERENCES: usize = 1_000_000;

/// Percentage of the maximum used as minimum when only the maximum is configured
pub const DEFAULT_MIN_FILL_PERCENT: usize = 40;

/// Default interval between two progress log lines, in milliseconds
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1000;

/// Record id of the owning container when none is given
pub const DEFAULT_CONTAINER_ID: u64 = 0;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x47525452; // "GRTR" - graph R-Tree

/// File format version
pub const VERSION: u32 = 1;

/// Size reserved for the file header in bytes
pub const HEADER_SIZE: usize = 64;
