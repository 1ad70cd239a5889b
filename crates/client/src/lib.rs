//! Custos Client Library
//!
//! Fault-tolerant access to a set of replicated authorization servers.
//!
//! ## Features
//!
//! - **Resilient Invocation**: two-tier retry over a shuffled endpoint list
//! - **Pluggable Channels**: channel establishment behind [`SecureChannelFactory`]
//! - **Typed Sync Client**: [`AuthzSyncClient`] for the path and permission
//!   synchronization calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use custos_client::{AuthzSyncClient, EndpointSet, ResilientRpcClient, RetryPolicy};
//!
//! let endpoints = EndpointSet::parse("authz-1:8038,authz-2", 8038)?;
//! let client = ResilientRpcClient::new(factory, endpoints, RetryPolicy::default());
//! let sync = AuthzSyncClient::new(client);
//!
//! let last_seen = sync.last_seen_path_sequence().await?;
//! ```

pub mod authz;
pub mod channel;
pub mod endpoints;
pub mod error;
pub mod resilient;

pub use authz::{AuthzSyncClient, AuthzSyncRpc, AuthzUpdates};
pub use channel::{
    ChannelBinder, ChannelStrategy, Handshake, MissingHandshake, SecureChannelFactory,
    TcpChannelFactory,
};
pub use endpoints::EndpointSet;
pub use error::{CallError, ChannelError, ClientError};
pub use resilient::{ResilientRpcClient, RetryPolicy};
