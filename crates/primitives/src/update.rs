use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::sequence::Sequence;

/// An independently sequenced category of synchronized state.
///
/// Domains never share counters and no ordering is implied between them.
#[derive(
    AsRefStr, Clone, Copy, Debug, Deserialize, Display, EnumIter, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    /// Authorizable object → set of filesystem paths.
    Paths,
    /// Role → groups and object → role → actions.
    Permissions,
}

/// One element of a "updates since N" response.
///
/// A full image replaces the consumer's state for the domain outright; a delta
/// is applied on top of what the consumer already holds.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Update<T> {
    pub sequence: Sequence,
    pub payload: T,
    pub full_image: bool,
}

impl<T> Update<T> {
    #[must_use]
    pub const fn delta(sequence: Sequence, payload: T) -> Self {
        Self {
            sequence,
            payload,
            full_image: false,
        }
    }

    #[must_use]
    pub const fn full_image(sequence: Sequence, payload: T) -> Self {
        Self {
            sequence,
            payload,
            full_image: true,
        }
    }

    #[must_use]
    pub const fn is_full_image(&self) -> bool {
        self.full_image
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Update<U> {
        Update {
            sequence: self.sequence,
            payload: f(self.payload),
            full_image: self.full_image,
        }
    }
}
