use core::fmt;

use serde::{Deserialize, Serialize};

/// Position in the history of a single domain.
///
/// Sequences are assigned by the metadata store, one per persisted mutation,
/// starting at `1`. Zero and negative values never name a real point in
/// history: consumers send them to ask for a full image.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Sentinel meaning "nothing seen yet".
    pub const UNINITIALIZED: Self = Self(0);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this names a real point in history (strictly positive).
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        self.0 > 0
    }

    /// The sequence directly after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for i64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_not_initialized() {
        assert!(!Sequence::UNINITIALIZED.is_initialized());
        assert!(!Sequence::new(-7).is_initialized());
        assert!(Sequence::new(1).is_initialized());
    }

    #[test]
    fn test_next_saturates() {
        assert_eq!(Sequence::new(41).next(), Sequence::new(42));
        assert_eq!(Sequence::new(i64::MAX).next(), Sequence::new(i64::MAX));
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Sequence::new(17)).unwrap();
        assert_eq!(json, "17");
    }
}
