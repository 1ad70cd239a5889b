//! Per-domain read adapters used by the update forwarder.

use std::sync::Arc;

use async_trait::async_trait;
use custos_primitives::{Image, Sequence, Update};

use crate::error::StoreResult;
use crate::MetadataStore;

/// Produces a full image of a domain, tagged with the sequence it reflects.
#[async_trait]
pub trait ImageRetriever<T>: Send + Sync {
    async fn retrieve_full_image(&self) -> StoreResult<Update<T>>;
}

/// Produces incremental history of a domain.
#[async_trait]
pub trait DeltaRetriever<T>: Send + Sync {
    async fn retrieve_delta(&self, from: Sequence) -> StoreResult<Vec<Update<T>>>;

    async fn latest_sequence(&self) -> StoreResult<Sequence>;
}

#[derive(Debug)]
pub struct StoreImageRetriever<S> {
    store: Arc<S>,
}

impl<S> StoreImageRetriever<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: MetadataStore> ImageRetriever<<S::Image as Image>::Payload> for StoreImageRetriever<S> {
    async fn retrieve_full_image(&self) -> StoreResult<Update<<S::Image as Image>::Payload>> {
        let (image, sequence) = self.store.read_full_image().await?;

        Ok(Update::full_image(sequence, image))
    }
}

#[derive(Debug)]
pub struct StoreDeltaRetriever<S> {
    store: Arc<S>,
}

impl<S> StoreDeltaRetriever<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: MetadataStore> DeltaRetriever<<S::Image as Image>::Payload> for StoreDeltaRetriever<S> {
    async fn retrieve_delta(
        &self,
        from: Sequence,
    ) -> StoreResult<Vec<Update<<S::Image as Image>::Payload>>> {
        self.store.read_delta(from).await
    }

    async fn latest_sequence(&self) -> StoreResult<Sequence> {
        self.store.latest_sequence().await
    }
}
