use custos_client::CallError;
use custos_primitives::ApplicationError;
use custos_store::StoreError;
use custos_sync::ForwardError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Whether the caller may repeat the request, possibly on another server.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Forward(err) => err.is_retryable(),
            Self::Store(err) => matches!(err, StoreError::Unavailable(_)),
        }
    }
}

impl From<ServiceError> for CallError {
    fn from(err: ServiceError) -> Self {
        if err.is_retryable() {
            Self::transport(err)
        } else {
            Self::Application(ApplicationError::Internal(err.to_string()))
        }
    }
}
