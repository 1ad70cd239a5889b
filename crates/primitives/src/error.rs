use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A negative result produced by the service after it received and executed
/// a call. These never indicate a broken connection.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, Error)]
#[non_exhaustive]
pub enum ApplicationError {
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}
