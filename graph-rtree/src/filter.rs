//! Search filters driving tree traversal.
//!
//! A [`SearchFilter`] decides which subtrees a traversal descends into and
//! which leaf entries it reports. The traversal itself has no spatial
//! knowledge; every kind of query is one of the filters below:
//! - `SearchAll` - every entry
//! - `IntersectsEnvelope` - entries sharing any point with a window
//! - `WithinEnvelope` - entries lying inside a window
//! - `CoversEnvelope` - entries containing a window
//! - `WithinDistance` - entries within a radius of a point
//! - `NearestCandidates` - the k entries closest to a point

use std::cell::{Cell, RefCell};
use std::fmt::{self, Display};

use crate::envelope::Envelope;
use crate::rtree::rtree_types::{Entry, ObjectId};

/// How a traversal treats a node given its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitDecision {
    /// Every entry below the node matches; leaf checks are skipped.
    IncludeAll,
    /// Nothing below the node can match.
    ExcludeAll,
    /// Descend and test each child or entry.
    Filter,
}

/// Predicate pair used to prune subtrees and accept leaf entries.
pub trait SearchFilter {
    /// Whether anything below a node with this envelope can match.
    fn needs_to_visit(&self, envelope: &Envelope) -> bool;

    fn matches(&self, entry: &Entry) -> bool;

    fn visit_decision(&self, envelope: &Envelope) -> VisitDecision {
        if self.needs_to_visit(envelope) {
            VisitDecision::Filter
        } else {
            VisitDecision::ExcludeAll
        }
    }
}

/// Matches every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchAll;

impl SearchFilter for SearchAll {
    fn needs_to_visit(&self, _envelope: &Envelope) -> bool {
        true
    }

    fn matches(&self, _entry: &Entry) -> bool {
        true
    }

    fn visit_decision(&self, _envelope: &Envelope) -> VisitDecision {
        VisitDecision::IncludeAll
    }
}

impl Display for SearchAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(all)")
    }
}

/// Range search: entries whose envelope intersects the window.
#[derive(Debug, Clone, Copy)]
pub struct IntersectsEnvelope(pub Envelope);

impl SearchFilter for IntersectsEnvelope {
    fn needs_to_visit(&self, envelope: &Envelope) -> bool {
        self.0.intersects(envelope)
    }

    fn matches(&self, entry: &Entry) -> bool {
        self.0.intersects(&entry.envelope)
    }

    fn visit_decision(&self, envelope: &Envelope) -> VisitDecision {
        if self.0.contains(envelope) {
            VisitDecision::IncludeAll
        } else if self.0.intersects(envelope) {
            VisitDecision::Filter
        } else {
            VisitDecision::ExcludeAll
        }
    }
}

impl Display for IntersectsEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(intersects {})", self.0)
    }
}

/// Entries lying completely inside the window.
#[derive(Debug, Clone, Copy)]
pub struct WithinEnvelope(pub Envelope);

impl SearchFilter for WithinEnvelope {
    fn needs_to_visit(&self, envelope: &Envelope) -> bool {
        self.0.intersects(envelope)
    }

    fn matches(&self, entry: &Entry) -> bool {
        self.0.contains(&entry.envelope)
    }

    fn visit_decision(&self, envelope: &Envelope) -> VisitDecision {
        if self.0.contains(envelope) {
            VisitDecision::IncludeAll
        } else if self.0.intersects(envelope) {
            VisitDecision::Filter
        } else {
            VisitDecision::ExcludeAll
        }
    }
}

impl Display for WithinEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(within {})", self.0)
    }
}

/// Entries whose envelope contains the window.
#[derive(Debug, Clone, Copy)]
pub struct CoversEnvelope(pub Envelope);

impl SearchFilter for CoversEnvelope {
    fn needs_to_visit(&self, envelope: &Envelope) -> bool {
        envelope.contains(&self.0)
    }

    fn matches(&self, entry: &Entry) -> bool {
        entry.envelope.contains(&self.0)
    }
}

impl Display for CoversEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(covers {})", self.0)
    }
}

/// Entries within `distance` of the point `(x, y)`.
#[derive(Debug, Clone, Copy)]
pub struct WithinDistance {
    pub x: f64,
    pub y: f64,
    pub distance: f64,
}

impl WithinDistance {
    pub fn new(x: f64, y: f64, distance: f64) -> Self {
        Self { x, y, distance }
    }
}

impl SearchFilter for WithinDistance {
    fn needs_to_visit(&self, envelope: &Envelope) -> bool {
        envelope.distance_to_point(self.x, self.y) <= self.distance
    }

    fn matches(&self, entry: &Entry) -> bool {
        entry.envelope.distance_to_point(self.x, self.y) <= self.distance
    }
}

impl Display for WithinDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(within {} of ({}, {}))", self.distance, self.x, self.y)
    }
}

/// The k-nearest candidate window.
///
/// Starts with a search radius of `max_distance`. Once `k` candidates are
/// known the radius shrinks to the distance of the farthest of them, so
/// later subtrees farther away are pruned. Entries reported by a traversal
/// are candidates only; [`NearestCandidates::into_results`] holds the
/// answer.
#[derive(Debug)]
pub struct NearestCandidates {
    x: f64,
    y: f64,
    k: usize,
    bound: Cell<f64>,
    best: RefCell<Vec<(f64, ObjectId)>>,
}

impl NearestCandidates {
    pub fn new(x: f64, y: f64, k: usize, max_distance: f64) -> Self {
        Self {
            x,
            y,
            k,
            bound: Cell::new(max_distance),
            best: RefCell::new(Vec::new()),
        }
    }

    /// Current pruning radius.
    pub fn radius(&self) -> f64 {
        self.bound.get()
    }

    /// The nearest objects with their distances, nearest first. Equal
    /// distances are ordered by object id.
    pub fn into_results(self) -> Vec<(ObjectId, f64)> {
        self.best
            .into_inner()
            .into_iter()
            .map(|(distance, object)| (object, distance))
            .collect()
    }
}

impl SearchFilter for NearestCandidates {
    fn needs_to_visit(&self, envelope: &Envelope) -> bool {
        self.k > 0 && envelope.distance_to_point(self.x, self.y) <= self.bound.get()
    }

    fn matches(&self, entry: &Entry) -> bool {
        if self.k == 0 {
            return false;
        }
        let distance = entry.envelope.distance_to_point(self.x, self.y);
        if distance > self.bound.get() {
            return false;
        }

        let mut best = self.best.borrow_mut();
        let candidate = (distance, entry.object);
        let position = best
            .binary_search_by(|probe| {
                probe
                    .0
                    .total_cmp(&candidate.0)
                    .then(probe.1.cmp(&candidate.1))
            })
            .unwrap_or_else(|p| p);
        best.insert(position, candidate);
        best.truncate(self.k);
        if best.len() == self.k {
            if let Some((farthest, _)) = best.last() {
                self.bound.set(*farthest);
            }
        }
        true
    }
}

impl Display for NearestCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} nearest to ({}, {}))", self.k, self.x, self.y)
    }
}
