use std::error::Error as StdError;
use std::io;

use custos_primitives::{ApplicationError, Endpoint};
use thiserror::Error;

/// Failure to establish a channel to one endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    #[error("failed to connect to {endpoint}")]
    ConnectFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error("authentication with {endpoint} failed: {reason}")]
    Authentication { endpoint: Endpoint, reason: String },
}

impl ChannelError {
    pub fn connect_failed(endpoint: &Endpoint, source: io::Error) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.clone(),
            source,
        }
    }
}

/// Outcome of a single call over an established channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallError {
    /// The channel broke or timed out; the connection is no longer usable.
    #[error("transport failure")]
    Transport(#[source] io::Error),
    /// The call reached the server and was rejected there.
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl CallError {
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Transport(io::Error::other(error))
    }
}

/// The only errors that leave [`ResilientRpcClient`](crate::ResilientRpcClient).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("`{op}` failed after {attempts} retries")]
    ServiceUnavailable {
        op: &'static str,
        attempts: u32,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error("authentication with {endpoint} failed: {reason}")]
    Authentication { endpoint: Endpoint, reason: String },
}
