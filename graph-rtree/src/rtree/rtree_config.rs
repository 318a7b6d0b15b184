//! Configuration of the R-Tree: fanout bounds and split strategy.

use serde::{Deserialize, Serialize};

use super::rtree_constants::{
    DEFAULT_MAX_NODE_REFERENCES, DEFAULT_MIN_FILL_PERCENT, DEFAULT_MIN_NODE_REFERENCES,
    MAX_MAX_NODE_REFERENCES,
};
use super::rtree_types::{SpatialError, SpatialResult};

/// How an overflowing node is divided in two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Guttman's quadratic split with dead-space seed selection
    #[default]
    Quadratic,
    /// Greene's split: sort along the longest axis and halve
    Greene,
}

/// Validated R-Tree configuration.
///
/// # Example
///
/// ```rust
/// use graph_rtree::{RTreeConfig, SplitMode};
///
/// let config = RTreeConfig::new(10, 4).unwrap().with_split_mode(SplitMode::Greene);
/// assert_eq!(config.max_node_references(), 10);
///
/// let parsed = RTreeConfig::from_json(r#"{"maxNodeReferences": 50}"#).unwrap();
/// assert_eq!(parsed.min_node_references(), 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RTreeConfig {
    max_node_references: usize,
    min_node_references: usize,
    split_mode: SplitMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    max_node_references: Option<usize>,
    min_node_references: Option<usize>,
    split_mode: Option<SplitMode>,
}

impl RTreeConfig {
    /// Creates a configuration with the given fanout bounds and quadratic split.
    pub fn new(max_node_references: usize, min_node_references: usize) -> SpatialResult<Self> {
        let config = Self {
            max_node_references,
            min_node_references,
            split_mode: SplitMode::Quadratic,
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration from a maximum only; the minimum is 40% of it.
    pub fn with_max(max_node_references: usize) -> SpatialResult<Self> {
        Self::new(max_node_references, default_min_for(max_node_references))
    }

    pub fn with_split_mode(mut self, split_mode: SplitMode) -> Self {
        self.split_mode = split_mode;
        self
    }

    pub fn max_node_references(&self) -> usize {
        self.max_node_references
    }

    pub fn min_node_references(&self) -> usize {
        self.min_node_references
    }

    pub fn split_mode(&self) -> SplitMode {
        self.split_mode
    }

    /// Parses a JSON configuration such as
    /// `{"maxNodeReferences": 100, "minNodeReferences": 40, "splitMode": "quadratic"}`.
    ///
    /// Unknown keys are rejected.
    pub fn from_json(json: &str) -> SpatialResult<Self> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| SpatialError::InvalidConfiguration(e.to_string()))?;

        let max = raw
            .max_node_references
            .unwrap_or(DEFAULT_MAX_NODE_REFERENCES);
        let min = match raw.min_node_references {
            Some(min) => min,
            None if raw.max_node_references.is_some() => default_min_for(max),
            None => DEFAULT_MIN_NODE_REFERENCES,
        };

        Ok(Self::new(max, min)?.with_split_mode(raw.split_mode.unwrap_or_default()))
    }

    pub fn to_json(&self) -> SpatialResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks the fanout bounds.
    pub fn validate(&self) -> SpatialResult<()> {
        let (max, min) = (self.max_node_references, self.min_node_references);
        if max == 0 || min == 0 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "node reference bounds must be positive (min {}, max {})",
                min, max
            )));
        }
        if min >= max {
            return Err(SpatialError::InvalidConfiguration(format!(
                "minNodeReferences {} must be smaller than maxNodeReferences {}",
                min, max
            )));
        }
        if max > MAX_MAX_NODE_REFERENCES {
            return Err(SpatialError::InvalidConfiguration(format!(
                "maxNodeReferences {} exceeds the limit of {}",
                max, MAX_MAX_NODE_REFERENCES
            )));
        }
        // a split of max + 1 items must be able to fill both halves
        if 2 * min > max + 1 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "minNodeReferences {} cannot be satisfied by splitting {} references",
                min,
                max + 1
            )));
        }
        Ok(())
    }
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self {
            max_node_references: DEFAULT_MAX_NODE_REFERENCES,
            min_node_references: DEFAULT_MIN_NODE_REFERENCES,
            split_mode: SplitMode::Quadratic,
        }
    }
}

fn default_min_for(max: usize) -> usize {
    (max * DEFAULT_MIN_FILL_PERCENT / 100).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RTreeConfig::default();
        assert_eq!(config.max_node_references(), 100);
        assert_eq!(config.min_node_references(), 40);
        assert_eq!(config.split_mode(), SplitMode::Quadratic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_invalid_bounds() {
        assert!(matches!(
            RTreeConfig::new(10, 10),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RTreeConfig::new(10, 0),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RTreeConfig::new(0, 0),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RTreeConfig::new(10, 7),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RTreeConfig::new(2_000_000, 10),
            Err(SpatialError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_half_fill_is_accepted() {
        assert!(RTreeConfig::new(10, 5).is_ok());
        assert!(RTreeConfig::new(3, 2).is_ok());
    }

    #[test]
    fn test_with_max() {
        let config = RTreeConfig::with_max(10).unwrap();
        assert_eq!(config.min_node_references(), 4);

        let tiny = RTreeConfig::with_max(2).unwrap();
        assert_eq!(tiny.min_node_references(), 1);
    }

    #[test]
    fn test_from_json() {
        let config = RTreeConfig::from_json(
            r#"{"maxNodeReferences": 20, "minNodeReferences": 8, "splitMode": "greene"}"#,
        )
        .unwrap();
        assert_eq!(config.max_node_references(), 20);
        assert_eq!(config.min_node_references(), 8);
        assert_eq!(config.split_mode(), SplitMode::Greene);

        let defaults = RTreeConfig::from_json("{}").unwrap();
        assert_eq!(defaults, RTreeConfig::default());
    }

    #[test]
    fn test_from_json_rejects_unknown_key() {
        let result = RTreeConfig::from_json(r#"{"maxNodeReferences": 20, "fanout": 3}"#);
        assert!(matches!(result, Err(SpatialError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_json_rejects_unknown_split_mode() {
        let result = RTreeConfig::from_json(r#"{"splitMode": "linear"}"#);
        assert!(matches!(result, Err(SpatialError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = RTreeConfig::new(30, 12)
            .unwrap()
            .with_split_mode(SplitMode::Greene);
        let json = config.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"maxNodeReferences":30,"minNodeReferences":12,"splitMode":"greene"}"#
        );
        assert_eq!(RTreeConfig::from_json(&json).unwrap(), config);
    }
}
