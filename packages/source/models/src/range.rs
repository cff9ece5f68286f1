//! Half-open entity id ranges.

use serde::{Deserialize, Serialize};

/// Errors for invalid id ranges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Remote ids start at 1.
    #[error("Range start must be at least 1, got {0}")]
    ZeroStart(u32),

    /// `end` lies before `start`.
    #[error("Range end {end} is before start {start}")]
    Inverted {
        /// Inclusive lower bound.
        start: u32,
        /// Exclusive upper bound.
        end: u32,
    },
}

/// Ids `start..end` (end exclusive).
///
/// `start == end` is the empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    /// Inclusive lower bound.
    pub start: u32,
    /// Exclusive upper bound.
    pub end: u32,
}

impl IdRange {
    /// Creates a validated range.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if `start` is 0 or `end < start`.
    pub const fn new(start: u32, end: u32) -> Result<Self, RangeError> {
        let range = Self { start, end };
        match range.validate() {
            Ok(()) => Ok(range),
            Err(e) => Err(e),
        }
    }

    /// Checks the range bounds. Ranges deserialized from config go through
    /// this before use.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if `start` is 0 or `end < start`.
    pub const fn validate(&self) -> Result<(), RangeError> {
        if self.start == 0 {
            return Err(RangeError::ZeroStart(self.start));
        }
        if self.end < self.start {
            return Err(RangeError::Inverted {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of ids in the range.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` for the empty range.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the ids in ascending order.
    #[must_use]
    pub const fn ids(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_is_valid() {
        let range = IdRange::new(5, 5).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.ids().count(), 0);
    }

    #[test]
    fn rejects_zero_start() {
        assert_eq!(IdRange::new(0, 3), Err(RangeError::ZeroStart(0)));
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(
            IdRange::new(10, 3),
            Err(RangeError::Inverted { start: 10, end: 3 })
        );
    }

    #[test]
    fn iterates_ascending() {
        let range = IdRange::new(1, 4).unwrap();
        assert_eq!(range.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(range.len(), 3);
        assert_eq!(range.to_string(), "[1, 4)");
    }
}
