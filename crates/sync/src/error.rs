//! Errors surfaced while serving updates.

use custos_primitives::Domain;
use custos_store::StoreError;
use thiserror::Error;

/// Failure to produce an update response.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum ForwardError {
    /// The backing store could not be read. Callers may retry.
    #[error("{domain} store unavailable")]
    StoreUnavailable {
        /// Domain being served.
        domain: Domain,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A forced resync produced something other than a full image.
    #[error("forced resync of {domain} produced {found} instead of a full image")]
    IncompleteFullImage {
        /// Domain being served.
        domain: Domain,
        /// What was produced instead.
        found: &'static str,
    },
}

impl ForwardError {
    /// Whether repeating the request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
