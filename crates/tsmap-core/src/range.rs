//! Closed integer point-index intervals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};

/// Closed interval `[lower, upper]` of point indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointRange {
    pub lower: i64,
    pub upper: i64,
}

impl PointRange {
    /// Returned for out-of-domain chunk lookups.
    pub const SENTINEL: PointRange = PointRange::closed(-1, -1);

    /// Interval without validation.
    pub const fn closed(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// Interval with `0 <= lower <= upper`.
    pub fn checked(lower: i64, upper: i64) -> MappingResult<Self> {
        let range = Self::closed(lower, upper);
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> MappingResult<()> {
        if self.lower < 0 || self.upper < self.lower {
            return Err(MappingError::MalformedRange {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    /// Number of points covered; zero for an inverted interval.
    pub fn len(&self) -> u64 {
        if self.upper < self.lower {
            0
        } else {
            (self.upper - self.lower) as u64 + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, point: i64) -> bool {
        self.lower <= point && point <= self.upper
    }

    /// True when the two intervals share at least one point.
    pub fn is_connected(&self, other: &PointRange) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }
}

impl fmt::Display for PointRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.lower, self.upper)
    }
}
