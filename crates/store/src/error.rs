use custos_primitives::Sequence;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// History from `requested` can no longer be reconstructed.
    #[error("sequence {requested} is older than the retained history (oldest {oldest})")]
    SequenceTooOld {
        requested: Sequence,
        oldest: Sequence,
    },
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}
