//! Two-tier retry around a single lazily opened connection.
//!
//! The outer loop retries whole calls up to `rpc_retry_total` times. Each
//! time a connection is needed the inner loop walks the endpoint list up to
//! `connection_full_retry_total` times. Transport failures drop the
//! connection and make the next connect start at a different server;
//! application failures are returned unchanged and keep the connection.
//! A call that outlives `call_timeout` counts as a transport failure.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::error::Error as StdError;
use std::io;

use custos_primitives::Endpoint;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::channel::SecureChannelFactory;
use crate::endpoints::EndpointSet;
use crate::error::{CallError, ChannelError, ClientError};

/// Default number of outer call attempts.
pub const DEFAULT_RPC_RETRY_TOTAL: u32 = 3;

/// Default number of full passes over the endpoint list per connect.
pub const DEFAULT_CONNECTION_FULL_RETRY_TOTAL: u32 = 2;

/// Default bound on a single call, matching the default connection timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(200_000);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub rpc_retry_total: u32,
    pub connection_full_retry_total: u32,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(rpc_retry_total: u32, connection_full_retry_total: u32) -> Self {
        Self {
            rpc_retry_total,
            connection_full_retry_total,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RPC_RETRY_TOTAL, DEFAULT_CONNECTION_FULL_RETRY_TOTAL)
    }
}

struct Connection<C> {
    channel: C,
    index: usize,
}

struct State<C> {
    connection: Option<Connection<C>>,
    last_index: Option<usize>,
    prefer_alternate: bool,
}

impl<C> State<C> {
    fn connect_start(&self, len: usize) -> usize {
        match self.last_index {
            Some(index) if self.prefer_alternate => (index + 1) % len,
            Some(index) => index,
            None => 0,
        }
    }
}

enum ConnectError {
    Authentication { endpoint: Endpoint, reason: String },
    Exhausted(Box<dyn StdError + Send + Sync>),
}

pub struct ResilientRpcClient<F: SecureChannelFactory> {
    factory: F,
    endpoints: EndpointSet,
    policy: RetryPolicy,
    state: Mutex<State<F::Channel>>,
    connection_attempts: AtomicU64,
}

impl<F: SecureChannelFactory> ResilientRpcClient<F> {
    pub fn new(factory: F, endpoints: EndpointSet, policy: RetryPolicy) -> Self {
        Self {
            factory,
            endpoints,
            policy,
            state: Mutex::new(State {
                connection: None,
                last_index: None,
                prefer_alternate: false,
            }),
            connection_attempts: AtomicU64::new(0),
        }
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub const fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    /// Total channel opens attempted over the client's lifetime.
    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts.load(Ordering::Relaxed)
    }

    /// Endpoint of the open connection, if any.
    pub async fn connected_endpoint(&self) -> Option<Endpoint> {
        let state = self.state.lock().await;

        state
            .connection
            .as_ref()
            .and_then(|connection| self.endpoints.get(connection.index))
            .cloned()
    }

    /// Drops the current connection; the next call reconnects.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;

        if let Some(connection) = state.connection.take() {
            debug!(index = connection.index, "closing connection");
        }
    }

    /// Runs `call` over the connection, retrying on transport failures.
    ///
    /// Calls on one client are serialized: the connection lock is held until
    /// the call resolves or `call_timeout` elapses.
    pub async fn invoke<R, Op>(&self, op: &'static str, mut call: Op) -> Result<R, ClientError>
    where
        R: Send,
        Op: for<'c> FnMut(&'c mut F::Channel) -> BoxFuture<'c, Result<R, CallError>> + Send,
    {
        let mut state = self.state.lock().await;
        let mut last_failure: Option<Box<dyn StdError + Send + Sync>> = None;

        for attempt in 1..=self.policy.rpc_retry_total {
            let mut connection = match state.connection.take() {
                Some(connection) => connection,
                None => match self.connect(&mut state).await {
                    Ok(connection) => connection,
                    Err(ConnectError::Authentication { endpoint, reason }) => {
                        error!(op, %endpoint, %reason, "authentication failed, not retrying");
                        return Err(ClientError::Authentication { endpoint, reason });
                    }
                    Err(ConnectError::Exhausted(err)) => {
                        warn!(op, attempt, %err, "could not connect to any server");
                        last_failure = Some(err);
                        continue;
                    }
                },
            };

            let outcome = timeout(self.policy.call_timeout, call(&mut connection.channel))
                .await
                .unwrap_or_else(|_| {
                    Err(CallError::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no response within {:?}", self.policy.call_timeout),
                    )))
                });

            match outcome {
                Ok(response) => {
                    state.connection = Some(connection);
                    return Ok(response);
                }
                Err(CallError::Application(err)) => {
                    debug!(op, %err, "call rejected by server");
                    state.connection = Some(connection);
                    return Err(ClientError::Application(err));
                }
                Err(CallError::Transport(err)) => {
                    warn!(
                        op,
                        attempt,
                        endpoint = ?self.endpoints.get(connection.index),
                        %err,
                        "transport failure, dropping connection"
                    );
                    state.prefer_alternate = true;
                    last_failure = Some(Box::new(err));
                }
            }
        }

        let attempts = self.policy.rpc_retry_total;
        error!(op, attempts, "giving up after exhausting retries");

        Err(ClientError::ServiceUnavailable {
            op,
            attempts,
            source: last_failure.unwrap_or_else(|| "no attempt was made".into()),
        })
    }

    async fn connect(
        &self,
        state: &mut State<F::Channel>,
    ) -> Result<Connection<F::Channel>, ConnectError> {
        let start = state.connect_start(self.endpoints.len());
        let mut last_error = None;

        for cycle in 1..=self.policy.connection_full_retry_total {
            for (index, endpoint) in self.endpoints.cycle_from(start) {
                let _ = self.connection_attempts.fetch_add(1, Ordering::Relaxed);

                match self.factory.open(endpoint).await {
                    Ok(channel) => {
                        info!(%endpoint, cycle, "connected");
                        state.last_index = Some(index);
                        state.prefer_alternate = false;
                        return Ok(Connection { channel, index });
                    }
                    Err(ChannelError::Authentication { endpoint, reason }) => {
                        return Err(ConnectError::Authentication { endpoint, reason });
                    }
                    Err(err) => {
                        debug!(%endpoint, cycle, %err, "connection attempt failed");
                        last_error = Some(err);
                    }
                }
            }

            if cycle < self.policy.connection_full_retry_total {
                warn!(cycle, "failed to connect to every configured server, retrying");
            }
        }

        Err(ConnectError::Exhausted(last_error.map_or_else(
            || "connection retries are disabled".into(),
            |err| Box::new(err) as Box<dyn StdError + Send + Sync>,
        )))
    }
}

impl<F> fmt::Debug for ResilientRpcClient<F>
where
    F: SecureChannelFactory + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientRpcClient")
            .field("factory", &self.factory)
            .field("endpoints", &self.endpoints)
            .field("policy", &self.policy)
            .field("connection_attempts", &self.connection_attempts())
            .finish_non_exhaustive()
    }
}
