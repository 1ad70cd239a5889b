//! Update sequencing and forced resynchronization.
//!
//! Consumers poll with the last sequence they have seen and receive either
//! the missing deltas or, when incremental tracking is impossible, a single
//! full image. On top of that the [`ResyncCoordinator`] lets an operator force
//! a full resync through both hops of the upstream → service → downstream
//! pipeline without ever releasing a stale image downstream.
//!
//! # Example
//!
//! ```rust,ignore
//! use custos_sync::{ResyncCoordinator, UpdateForwarder};
//!
//! let forwarder = UpdateForwarder::from_store(store.paths());
//! let coordinator = ResyncCoordinator::new();
//!
//! let updates = coordinator
//!     .on_downstream_update_request(cursor, &forwarder)
//!     .await?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod forwarder;
pub mod resync;

pub use error::ForwardError;
pub use forwarder::UpdateForwarder;
pub use resync::{ResyncCoordinator, ResyncState};
