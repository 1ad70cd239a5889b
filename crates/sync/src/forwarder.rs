//! Serves "updates since sequence N" for one domain.

use core::fmt;
use std::sync::Arc;

use custos_primitives::{Domain, Image, Sequence, Update};
use custos_store::{
    DeltaRetriever, ImageRetriever, MetadataStore, StoreDeltaRetriever, StoreError,
    StoreImageRetriever,
};
use tracing::{debug, info, warn};

use crate::error::ForwardError;

/// Combines a domain's image and delta retrievers into one read path.
///
/// The forwarder never mutates domain state and may be shared freely between
/// concurrent request handlers.
pub struct UpdateForwarder<T> {
    domain: Domain,
    images: Arc<dyn ImageRetriever<T>>,
    deltas: Arc<dyn DeltaRetriever<T>>,
}

impl<T> UpdateForwarder<T> {
    /// Builds a forwarder from explicit retrievers.
    pub fn new(
        domain: Domain,
        images: Arc<dyn ImageRetriever<T>>,
        deltas: Arc<dyn DeltaRetriever<T>>,
    ) -> Self {
        Self {
            domain,
            images,
            deltas,
        }
    }

    /// Builds a forwarder reading straight from a store.
    pub fn from_store<S, I>(store: Arc<S>) -> Self
    where
        S: MetadataStore<Image = I>,
        I: Image<Payload = T>,
    {
        Self::new(
            I::DOMAIN,
            Arc::new(StoreImageRetriever::new(Arc::clone(&store))),
            Arc::new(StoreDeltaRetriever::new(store)),
        )
    }

    /// Domain served by this forwarder.
    #[must_use]
    pub const fn domain(&self) -> Domain {
        self.domain
    }

    /// Returns everything after `since`, oldest first.
    ///
    /// * An uninitialized cursor (zero or negative) yields `[full_image]`.
    /// * A cursor at or past the latest sequence yields an empty list.
    /// * Otherwise the contiguous deltas from `since + 1`, falling back to
    ///   `[full_image]` when that history can no longer be reconstructed.
    pub async fn get_updates_since(&self, since: Sequence) -> Result<Vec<Update<T>>, ForwardError> {
        if !since.is_initialized() {
            debug!(domain = %self.domain, %since, "uninitialized cursor, sending full image");
            return Ok(vec![self.full_image().await?]);
        }

        let latest = self
            .deltas
            .latest_sequence()
            .await
            .map_err(|source| self.unavailable(source))?;

        if since >= latest {
            return Ok(Vec::new());
        }

        let from = since.next();

        match self.deltas.retrieve_delta(from).await {
            Ok(updates) if updates.first().is_some_and(|u| u.sequence == from) => {
                debug!(
                    domain = %self.domain,
                    %since,
                    count = updates.len(),
                    "sending incremental updates"
                );
                Ok(updates)
            }
            Ok(updates) => {
                warn!(
                    domain = %self.domain,
                    %from,
                    first = ?updates.first().map(|u| u.sequence),
                    "delta history is not contiguous, falling back to full image"
                );
                Ok(vec![self.full_image().await?])
            }
            Err(StoreError::SequenceTooOld { oldest, .. }) => {
                info!(
                    domain = %self.domain,
                    %since,
                    %oldest,
                    "cursor is older than retained history, sending full image"
                );
                Ok(vec![self.full_image().await?])
            }
            Err(source) => Err(self.unavailable(source)),
        }
    }

    /// Current full image of the domain.
    pub async fn full_image(&self) -> Result<Update<T>, ForwardError> {
        self.images
            .retrieve_full_image()
            .await
            .map_err(|source| self.unavailable(source))
    }

    /// Latest sequence persisted for the domain.
    pub async fn latest_sequence(&self) -> Result<Sequence, ForwardError> {
        self.deltas
            .latest_sequence()
            .await
            .map_err(|source| self.unavailable(source))
    }

    fn unavailable(&self, source: StoreError) -> ForwardError {
        ForwardError::StoreUnavailable {
            domain: self.domain,
            source,
        }
    }
}

impl<T> fmt::Debug for UpdateForwarder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateForwarder")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}
