use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error parsing a coordinate from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid coordinate '{0}': expected comma-separated indices like 2,0,1")]
pub struct CoordinateParseError(pub String);

/// Positional address of a node: one index per level from the root down.
///
/// The empty coordinate addresses the root collection itself. Coordinates
/// are only valid against the tree they were computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(Vec<usize>);

impl Coordinate {
    pub fn root() -> Self {
        Coordinate(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Coordinate(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The coordinate of the `index`-th child under this one
    pub fn child(&self, index: usize) -> Coordinate {
        let mut indices = self.0.clone();
        indices.push(index);
        Coordinate(indices)
    }

    /// Split into the parent coordinate and this node's index in it
    pub fn split_last(&self) -> Option<(Coordinate, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((Coordinate(rest.to_vec()), *last))
    }

    /// The first `len` indices
    pub fn truncated(&self, len: usize) -> Coordinate {
        Coordinate(self.0[..len.min(self.0.len())].to_vec())
    }

    /// True if `prefix` addresses this coordinate or one of its ancestors
    pub fn starts_with(&self, prefix: &Coordinate) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Dotted form used in outlines, e.g. `2.0.1`
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<Vec<usize>> for Coordinate {
    fn from(indices: Vec<usize>) -> Self {
        Coordinate(indices)
    }
}

impl<const N: usize> From<[usize; N]> for Coordinate {
    fn from(indices: [usize; N]) -> Self {
        Coordinate(indices.to_vec())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "root");
        }
        write!(f, "[{}]", self.dotted().replace('.', ","))
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateParseError;

    /// Accepts `root`, an empty string, `2,0,1`, `[2,0,1]` or `2.0.1`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed)
            .trim();
        if inner.is_empty() || inner == "root" {
            return Ok(Coordinate::root());
        }
        inner
            .split([',', '.'])
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Coordinate)
            .map_err(|_| CoordinateParseError(s.to_string()))
    }
}
