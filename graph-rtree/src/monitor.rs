//! Observation hooks: tree monitors and progress listeners.
//!
//! A [`TreeMonitor`] receives structural events (splits, condense rounds,
//! visited nodes per level) and is what tests use to verify that searches
//! prune. A [`Listener`] receives progress for long bulk operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::rtree::rtree_constants::DEFAULT_PROGRESS_INTERVAL_MS;
use crate::rtree::rtree_types::NodeId;

/// Traversal case: a node envelope passed the filter
pub const CASE_INDEX_MATCHES: &str = "Index Matches";
/// Traversal case: a node envelope was pruned
pub const CASE_INDEX_DOES_NOT_MATCH: &str = "Index Does NOT Match";
/// Traversal case: a leaf entry matched
pub const CASE_ENTRY_MATCHES: &str = "Entry Matches";
/// Traversal case: a leaf entry was rejected
pub const CASE_ENTRY_DOES_NOT_MATCH: &str = "Entry Does NOT Match";

/// Receives structural events from an R-tree.
pub trait TreeMonitor: Send + Sync {
    fn set_height(&self, height: u32);

    fn height(&self) -> u32;

    /// A condense round removed a subtree and re-inserted its entries.
    fn add_rebuilt(&self);

    fn rebuilt_count(&self) -> u64;

    fn add_split(&self, node: NodeId);

    fn split_count(&self) -> u64;

    fn add_case(&self, key: &str);

    fn case_counts(&self) -> HashMap<String, u64>;

    /// A traversal visited `node` at `level` (the root is level 0).
    fn matched_tree_node(&self, level: usize, node: NodeId);

    fn matched_tree_nodes(&self, level: usize) -> Vec<NodeId>;

    fn reset(&self);
}

/// Monitor that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyMonitor;

impl TreeMonitor for EmptyMonitor {
    fn set_height(&self, _height: u32) {}

    fn height(&self) -> u32 {
        0
    }

    fn add_rebuilt(&self) {}

    fn rebuilt_count(&self) -> u64 {
        0
    }

    fn add_split(&self, _node: NodeId) {}

    fn split_count(&self) -> u64 {
        0
    }

    fn add_case(&self, _key: &str) {}

    fn case_counts(&self) -> HashMap<String, u64> {
        HashMap::new()
    }

    fn matched_tree_node(&self, _level: usize, _node: NodeId) {}

    fn matched_tree_nodes(&self, _level: usize) -> Vec<NodeId> {
        Vec::new()
    }

    fn reset(&self) {}
}

/// Monitor that keeps counters and the visited nodes of every level.
#[derive(Debug, Default)]
pub struct RTreeMonitor {
    height: AtomicU32,
    splits: AtomicU64,
    rebuilt: AtomicU64,
    cases: Mutex<HashMap<String, u64>>,
    matched: Mutex<Vec<Vec<NodeId>>>,
}

impl RTreeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes visited by traversals since the last reset.
    pub fn visited_node_count(&self) -> usize {
        self.matched.lock().iter().map(Vec::len).sum()
    }
}

impl TreeMonitor for RTreeMonitor {
    fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::Relaxed);
    }

    fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    fn add_rebuilt(&self) {
        self.rebuilt.fetch_add(1, Ordering::Relaxed);
    }

    fn rebuilt_count(&self) -> u64 {
        self.rebuilt.load(Ordering::Relaxed)
    }

    fn add_split(&self, _node: NodeId) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    fn split_count(&self) -> u64 {
        self.splits.load(Ordering::Relaxed)
    }

    fn add_case(&self, key: &str) {
        *self.cases.lock().entry(key.to_string()).or_insert(0) += 1;
    }

    fn case_counts(&self) -> HashMap<String, u64> {
        self.cases.lock().clone()
    }

    fn matched_tree_node(&self, level: usize, node: NodeId) {
        let mut matched = self.matched.lock();
        if matched.len() <= level {
            matched.resize_with(level + 1, Vec::new);
        }
        matched[level].push(node);
    }

    fn matched_tree_nodes(&self, level: usize) -> Vec<NodeId> {
        self.matched
            .lock()
            .get(level)
            .cloned()
            .unwrap_or_default()
    }

    fn reset(&self) {
        self.height.store(0, Ordering::Relaxed);
        self.splits.store(0, Ordering::Relaxed);
        self.rebuilt.store(0, Ordering::Relaxed);
        self.cases.lock().clear();
        self.matched.lock().clear();
    }
}

// ============================================================================
// Progress Listeners
// ============================================================================

/// Progress callbacks for bulk operations.
pub trait Listener {
    fn begin(&mut self, units_of_work: usize);

    fn worked(&mut self, units: usize);

    fn done(&mut self);
}

/// Listener that ignores progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl Listener for NullListener {
    fn begin(&mut self, _units_of_work: usize) {}

    fn worked(&mut self, _units: usize) {}

    fn done(&mut self) {}
}

/// Listener that logs progress through `log::info!`, at most once per
/// interval.
#[derive(Debug)]
pub struct ProgressLoggingListener {
    name: String,
    interval: Duration,
    last_log: Option<Instant>,
    total_units: usize,
    worked_so_far: usize,
    lines_logged: usize,
}

impl ProgressLoggingListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            last_log: None,
            total_units: 0,
            worked_so_far: 0,
            lines_logged: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Completed share of the work in percent.
    pub fn percent(&self) -> f64 {
        if self.total_units == 0 {
            100.0
        } else {
            100.0 * self.worked_so_far as f64 / self.total_units as f64
        }
    }

    pub fn lines_logged(&self) -> usize {
        self.lines_logged
    }

    fn log(&mut self, line: String) {
        log::info!("{}", line);
        self.lines_logged += 1;
    }
}

impl Listener for ProgressLoggingListener {
    fn begin(&mut self, units_of_work: usize) {
        self.total_units = units_of_work;
        self.worked_so_far = 0;
        self.last_log = None;
        self.log(format!("Starting {}", self.name));
    }

    fn worked(&mut self, units: usize) {
        self.worked_so_far += units;
        let due = match self.last_log {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        };
        if due {
            self.last_log = Some(Instant::now());
            self.log(format!(
                "Running {}: {:.2}% ({}/{})",
                self.name,
                self.percent(),
                self.worked_so_far,
                self.total_units
            ));
        }
    }

    fn done(&mut self) {
        self.log(format!(
            "Completed {}: {}/{}",
            self.name, self.worked_so_far, self.total_units
        ));
    }
}
