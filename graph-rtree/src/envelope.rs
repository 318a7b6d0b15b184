use std::hash::Hash;

/// An axis-aligned bounding box over 2D coordinates.
///
/// `Envelope` is the unit of all geometry the R-tree understands: every
/// node stores one, every entry caches one, and every search filter is
/// evaluated against them. An envelope may be *empty* (no bounds set), which
/// is how an empty root node is represented. The empty envelope is the
/// identity of [`Envelope::union`].
///
/// # Examples
///
/// ```rust
/// use graph_rtree::Envelope;
///
/// let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
/// let b = Envelope::new(5.0, 5.0, 20.0, 20.0);
///
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(&b), Envelope::new(0.0, 0.0, 20.0, 20.0));
/// assert_eq!(a.enlargement(&b), 400.0 - 100.0);
/// ```
#[derive(Clone, Copy, PartialEq, Debug, serde::Deserialize, serde::Serialize)]
pub struct Envelope {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Eq for Envelope {}

impl Hash for Envelope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Envelope(empty)")
        } else {
            write!(
                f,
                "Envelope({}, {}, {}, {})",
                self.min_x, self.min_y, self.max_x, self.max_y
            )
        }
    }
}

impl Envelope {
    /// Creates a new envelope with the specified corners.
    ///
    /// # Arguments
    ///
    /// * `min_x` - Minimum X coordinate
    /// * `min_y` - Minimum Y coordinate
    /// * `max_x` - Maximum X coordinate
    /// * `max_y` - Maximum Y coordinate
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Envelope {
        Envelope {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a degenerate envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Envelope {
        Envelope::new(x, y, x, y)
    }

    /// The envelope with no bounds set.
    pub fn empty() -> Envelope {
        Envelope {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Builds an envelope from a `[min_x, min_y, max_x, max_y]` array.
    ///
    /// Returns `None` when any value is NaN or the bounds are inverted.
    pub fn from_array(bbox: [f64; 4]) -> Option<Envelope> {
        if bbox.iter().any(|v| v.is_nan()) {
            return None;
        }
        let envelope = Envelope::new(bbox[0], bbox[1], bbox[2], bbox[3]);
        if envelope.is_empty() {
            None
        } else {
            Some(envelope)
        }
    }

    /// The `[min_x, min_y, max_x, max_y]` array form, or `None` when empty.
    pub fn to_array(&self) -> Option<[f64; 4]> {
        if self.is_empty() {
            None
        } else {
            Some([self.min_x, self.min_y, self.max_x, self.max_y])
        }
    }

    /// Smallest envelope covering every envelope of the iterator.
    pub fn union_all<'a, I>(envelopes: I) -> Envelope
    where
        I: IntoIterator<Item = &'a Envelope>,
    {
        envelopes
            .into_iter()
            .fold(Envelope::empty(), |acc, e| acc.union(e))
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Returns the width of the envelope, 0 when empty.
    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    /// Returns the height of the envelope, 0 when empty.
    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    /// Returns the area of the envelope.
    ///
    /// Degenerate (zero width or zero height) and empty envelopes have area 0.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point, or `None` when empty.
    pub fn center(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            None
        } else {
            Some(((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0))
        }
    }

    /// Checks if this envelope contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if this envelope fully contains `other`.
    ///
    /// An empty envelope contains nothing and is contained by nothing.
    pub fn contains(&self, other: &Envelope) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if this envelope shares at least one point with `other`.
    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Returns the smallest envelope covering both.
    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Widens this envelope in place to cover `other`.
    /// Returns whether any bound moved.
    pub fn expand_to_include(&mut self, other: &Envelope) -> bool {
        let merged = self.union(other);
        if merged == *self {
            false
        } else {
            *self = merged;
            true
        }
    }

    /// Area growth needed for this envelope to also cover `other`.
    ///
    /// Computed as `area(union) - area(self)`; 0 when `other` is already
    /// contained.
    pub fn enlargement(&self, other: &Envelope) -> f64 {
        if self.contains(other) {
            return 0.0;
        }
        self.union(other).area() - self.area()
    }

    /// Dead space of the pair: area of the union minus both areas.
    /// Used to pick split seeds.
    pub fn separation(&self, other: &Envelope) -> f64 {
        self.union(other).area() - self.area() - other.area()
    }

    /// Returns the overlapping region, if any.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Minimum Euclidean distance from a point to this envelope; 0 when the
    /// point is inside and infinite when the envelope is empty.
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        if self.is_empty() {
            return f64::INFINITY;
        }
        let closest_x = x.clamp(self.min_x, self.max_x);
        let closest_y = y.clamp(self.min_y, self.max_y);

        let dx = x - closest_x;
        let dy = y - closest_y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Checks if this envelope is a point (zero width and height).
    pub fn is_point(&self) -> bool {
        !self.is_empty() && self.min_x == self.max_x && self.min_y == self.max_y
    }
}
