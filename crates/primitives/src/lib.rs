//! Shared types for the Custos authorization metadata service.
//!
//! Everything that crosses a crate boundary lives here: sequence numbers,
//! synchronization domains, the [`Update`] envelope and the two domain
//! payloads ([`paths::PathsUpdate`] and [`permissions::PermissionsUpdate`]),
//! server endpoints and the application-level error taxonomy.

pub mod endpoint;
pub mod error;
pub mod image;
pub mod paths;
pub mod permissions;
pub mod sequence;
pub mod update;

pub use endpoint::{Endpoint, EndpointError, DEFAULT_RPC_PORT};
pub use error::ApplicationError;
pub use image::Image;
pub use sequence::Sequence;
pub use update::{Domain, Update};
