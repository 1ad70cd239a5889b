//! Metadata store abstraction and the in-memory engine behind the service.
//!
//! Each domain is an independent, sequenced log: every persisted mutation
//! gets the next sequence number, the materialized image is kept current and
//! a bounded window of recent deltas is retained for incremental catch-up.

use std::sync::Arc;

use async_trait::async_trait;
use custos_primitives::paths::PathsImage;
use custos_primitives::permissions::PermissionsImage;
use custos_primitives::{Image, Sequence, Update};

pub mod config;
pub mod error;
pub mod memory;
pub mod retriever;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::DomainLog;
pub use retriever::{DeltaRetriever, ImageRetriever, StoreDeltaRetriever, StoreImageRetriever};

/// Persistence for one domain.
///
/// Implementations assign sequence numbers; callers never choose them.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    type Image: Image;

    /// Persists an incremental change and returns its sequence.
    async fn persist(
        &self,
        change: <Self::Image as Image>::Payload,
    ) -> StoreResult<Sequence>;

    /// Replaces the domain with `image`, discarding delta history.
    async fn persist_full_image(
        &self,
        image: <Self::Image as Image>::Payload,
    ) -> StoreResult<Sequence>;

    /// Complete current state together with the sequence it reflects.
    async fn read_full_image(
        &self,
    ) -> StoreResult<(<Self::Image as Image>::Payload, Sequence)>;

    /// Contiguous deltas starting at `from`, or [`StoreError::SequenceTooOld`]
    /// when that history is gone.
    async fn read_delta(
        &self,
        from: Sequence,
    ) -> StoreResult<Vec<Update<<Self::Image as Image>::Payload>>>;

    async fn latest_sequence(&self) -> StoreResult<Sequence>;
}

/// Both domains of the service, each backed by its own [`DomainLog`].
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    paths: Arc<DomainLog<PathsImage>>,
    permissions: Arc<DomainLog<PermissionsImage>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            paths: Arc::new(DomainLog::new(config.delta_retention)),
            permissions: Arc::new(DomainLog::new(config.delta_retention)),
        }
    }

    #[must_use]
    pub fn paths(&self) -> Arc<DomainLog<PathsImage>> {
        Arc::clone(&self.paths)
    }

    #[must_use]
    pub fn permissions(&self) -> Arc<DomainLog<PermissionsImage>> {
        Arc::clone(&self.permissions)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
