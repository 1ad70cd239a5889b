//! Channel establishment.
//!
//! The retry client only knows [`SecureChannelFactory`]. The TCP factory
//! here covers the socket and timeout; authentication and wire encoding are
//! injected through [`Handshake`] and [`ChannelBinder`].

use core::time::Duration;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use custos_primitives::Endpoint;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ChannelError;

#[async_trait]
pub trait SecureChannelFactory: Send + Sync {
    type Channel: Send;

    /// Opens a channel to `endpoint`.
    ///
    /// [`ChannelError::ConnectFailed`] is retried like any connect failure;
    /// [`ChannelError::Authentication`] aborts the whole invocation.
    async fn open(&self, endpoint: &Endpoint) -> Result<Self::Channel, ChannelError>;
}

/// Authenticates a freshly connected stream.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn authenticate(
        &self,
        endpoint: &Endpoint,
        stream: &mut TcpStream,
    ) -> Result<(), ChannelError>;
}

/// Wraps a connected stream in the wire protocol.
pub trait ChannelBinder: Send + Sync {
    type Channel: Send;

    fn bind(&self, endpoint: &Endpoint, stream: TcpStream) -> Self::Channel;
}

#[derive(Clone, Copy, Debug, Error)]
#[error("a secure channel is required but no handshake is configured")]
pub struct MissingHandshake;

/// How channels are secured, decided once from configuration.
#[derive(Clone)]
pub enum ChannelStrategy {
    Plain,
    Authenticated(Arc<dyn Handshake>),
}

impl ChannelStrategy {
    pub fn resolve(
        secure_channel_required: bool,
        handshake: Option<Arc<dyn Handshake>>,
    ) -> Result<Self, MissingHandshake> {
        match (secure_channel_required, handshake) {
            (true, Some(handshake)) => Ok(Self::Authenticated(handshake)),
            (true, None) => Err(MissingHandshake),
            (false, handshake) => {
                if handshake.is_some() {
                    debug!("secure channel not required, handshake will not be used");
                }
                Ok(Self::Plain)
            }
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl core::fmt::Debug for ChannelStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Plain => f.write_str("Plain"),
            Self::Authenticated(_) => f.write_str("Authenticated"),
        }
    }
}

#[derive(Debug)]
pub struct TcpChannelFactory<B> {
    binder: B,
    strategy: ChannelStrategy,
    connect_timeout: Duration,
}

impl<B> TcpChannelFactory<B> {
    pub const fn new(binder: B, strategy: ChannelStrategy, connect_timeout: Duration) -> Self {
        Self {
            binder,
            strategy,
            connect_timeout,
        }
    }

    pub const fn strategy(&self) -> &ChannelStrategy {
        &self.strategy
    }
}

#[async_trait]
impl<B: ChannelBinder> SecureChannelFactory for TcpChannelFactory<B> {
    type Channel = B::Channel;

    async fn open(&self, endpoint: &Endpoint) -> Result<Self::Channel, ChannelError> {
        let Ok(established) = timeout(self.connect_timeout, self.establish(endpoint)).await else {
            let err = io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no channel within {:?}", self.connect_timeout),
            );
            return Err(ChannelError::connect_failed(endpoint, err));
        };

        let stream = established?;

        debug!(%endpoint, authenticated = self.strategy.is_authenticated(), "channel established");

        Ok(self.binder.bind(endpoint, stream))
    }
}

impl<B> TcpChannelFactory<B> {
    /// Connects and authenticates; bounded as a whole by the connect timeout.
    async fn establish(&self, endpoint: &Endpoint) -> Result<TcpStream, ChannelError> {
        let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|err| ChannelError::connect_failed(endpoint, err))?;

        if let ChannelStrategy::Authenticated(handshake) = &self.strategy {
            handshake.authenticate(endpoint, &mut stream).await?;
        }

        Ok(stream)
    }
}
