//! Signal-triggered full resynchronization across both pipeline hops.
//!
//! Normally the upstream producer pushes deltas and the downstream consumer
//! polls for them; sequence numbers alone detect when either side drifted.
//! Some divergences are invisible to sequence numbers, so an operator can
//! force a full resync:
//!
//! 1. [`ResyncCoordinator::on_signal`] arms three flags.
//! 2. The next upstream cursor request is answered with the uninitialized
//!    sentinel, once, so the producer pushes a full image.
//! 3. Receiving that image releases the downstream hop.
//! 4. The next downstream request is answered with a full image, once.
//!
//! The flags are independent atomics. Upstream and downstream request
//! handling never wait on each other.
//!
//! Each armed signal bumps a generation counter. An upstream image only
//! releases the downstream hop if no signal arrived while it was being
//! stored, so an image captured before the signal never stands in for one
//! requested by it.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use custos_primitives::{Sequence, Update};
use tracing::{debug, error, info};

use crate::error::ForwardError;
use crate::forwarder::UpdateForwarder;

/// Observable progress of a forced resync.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResyncState {
    /// No resync in progress.
    Idle,
    /// Waiting for the upstream producer to deliver a fresh full image.
    UpstreamRequested,
    /// A full image arrived before the producer polled its cursor; the
    /// cursor request is still armed.
    UpstreamReceived,
    /// Upstream delivered; the next downstream request receives a full image.
    DownstreamPending,
}

/// Cross-domain state machine for operator-forced resyncs.
#[derive(Debug, Default)]
pub struct ResyncCoordinator {
    pending_upstream_resync: AtomicBool,
    pending_downstream_resync: AtomicBool,
    downstream_waiting_on_upstream: AtomicBool,
    signal_generation: AtomicU64,
}

impl ResyncCoordinator {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a full resync. Returns `false` when one is already in progress,
    /// in which case nothing changes.
    pub fn on_signal(&self) -> bool {
        if self.pending_downstream_resync.load(Ordering::SeqCst) {
            debug!("full resync already in progress, ignoring signal");
            return false;
        }

        // The generation moves before the gate closes so that an image
        // finishing concurrently either sees the new generation or is
        // overwritten by the gate.
        let _ = self.signal_generation.fetch_add(1, Ordering::SeqCst);

        // The downstream gate must be closed before the downstream flag is
        // raised, otherwise a concurrent downstream request could observe
        // pending && !waiting and release a stale image.
        self.downstream_waiting_on_upstream
            .store(true, Ordering::SeqCst);
        self.pending_upstream_resync.store(true, Ordering::SeqCst);
        self.pending_downstream_resync.store(true, Ordering::SeqCst);

        info!("full resync requested for upstream and downstream");
        true
    }

    /// Called when the upstream producer asks which sequence the service has
    /// seen. Returns `true` exactly once per signal, meaning the caller must
    /// answer with [`Sequence::UNINITIALIZED`].
    pub fn on_upstream_cursor_request(&self) -> bool {
        let requested = self.pending_upstream_resync.swap(false, Ordering::SeqCst);

        if requested {
            info!("asking upstream producer for a full image");
        }

        requested
    }

    /// Number of signals that armed a resync so far.
    ///
    /// Read this before storing an upstream full image and hand it to
    /// [`on_upstream_full_image_received`](Self::on_upstream_full_image_received).
    #[must_use]
    pub fn signal_generation(&self) -> u64 {
        self.signal_generation.load(Ordering::SeqCst)
    }

    /// Called once an upstream full image is stored. `generation` is the
    /// [`signal_generation`](Self::signal_generation) read before storing it.
    ///
    /// Full image deliveries must not overlap.
    pub fn on_upstream_full_image_received(&self, generation: u64) {
        let was_waiting = self
            .downstream_waiting_on_upstream
            .swap(false, Ordering::SeqCst);

        if self.signal_generation.load(Ordering::SeqCst) != generation {
            self.downstream_waiting_on_upstream
                .store(true, Ordering::SeqCst);
            info!(
                generation,
                "upstream full image predates the latest signal, downstream keeps waiting"
            );
            return;
        }

        if was_waiting && self.pending_downstream_resync.load(Ordering::SeqCst) {
            info!("upstream full image received, downstream resync released");
        }
    }

    /// Serves a downstream update request, substituting a full image when a
    /// released resync is pending.
    ///
    /// A forced resync that yields anything other than a full image is an
    /// error and leaves the resync pending for the next request.
    pub async fn on_downstream_update_request<T>(
        &self,
        since: Sequence,
        forwarder: &UpdateForwarder<T>,
    ) -> Result<Vec<Update<T>>, ForwardError> {
        if !self.take_downstream_resync() {
            return forwarder.get_updates_since(since).await;
        }

        info!(domain = %forwarder.domain(), %since, "sending forced full image downstream");

        match forwarder.full_image().await {
            Ok(update) if update.is_full_image() => {
                info!(
                    domain = %forwarder.domain(),
                    sequence = %update.sequence,
                    "confirmed full image sent downstream"
                );
                Ok(vec![update])
            }
            Ok(update) => {
                self.pending_downstream_resync.store(true, Ordering::SeqCst);
                error!(
                    domain = %forwarder.domain(),
                    sequence = %update.sequence,
                    "forced resync produced a partial update, keeping resync pending"
                );
                Err(ForwardError::IncompleteFullImage {
                    domain: forwarder.domain(),
                    found: "a partial update",
                })
            }
            Err(err) => {
                self.pending_downstream_resync.store(true, Ordering::SeqCst);
                error!(%err, "forced resync failed, keeping resync pending");
                Err(err)
            }
        }
    }

    /// Current progress, derived from the flags.
    #[must_use]
    pub fn state(&self) -> ResyncState {
        let downstream = self.pending_downstream_resync.load(Ordering::SeqCst);
        let waiting = self.downstream_waiting_on_upstream.load(Ordering::SeqCst);
        let upstream = self.pending_upstream_resync.load(Ordering::SeqCst);

        match (downstream, waiting, upstream) {
            (false, _, _) => ResyncState::Idle,
            (true, true, _) => ResyncState::UpstreamRequested,
            (true, false, true) => ResyncState::UpstreamReceived,
            (true, false, false) => ResyncState::DownstreamPending,
        }
    }

    fn take_downstream_resync(&self) -> bool {
        self.pending_downstream_resync.load(Ordering::SeqCst)
            && !self.downstream_waiting_on_upstream.load(Ordering::SeqCst)
            && self
                .pending_downstream_resync
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use claims::{assert_err, assert_ok};
    use custos_primitives::paths::{PathsImage, PathsUpdate};
    use custos_primitives::Domain;
    use custos_store::{
        DomainLog, ImageRetriever, MetadataStore, StoreDeltaRetriever, StoreResult,
    };

    use super::*;

    fn add(object: &str, path: &str) -> PathsUpdate {
        let mut update = PathsUpdate::new();
        let _ = update.object(object).add_path(path);
        update
    }

    async fn forwarder_with(count: usize) -> (Arc<DomainLog<PathsImage>>, UpdateForwarder<PathsUpdate>) {
        let log = Arc::new(DomainLog::<PathsImage>::new(100));
        for i in 0..count {
            let _ = log.persist(add("db", &format!("/db/{i}"))).await.unwrap();
        }
        let forwarder = UpdateForwarder::from_store(Arc::clone(&log));
        (log, forwarder)
    }

    #[test]
    fn test_signal_arms_all_flags() {
        let coordinator = ResyncCoordinator::new();
        assert_eq!(coordinator.state(), ResyncState::Idle);

        assert!(coordinator.on_signal());
        assert_eq!(coordinator.state(), ResyncState::UpstreamRequested);
    }

    #[test]
    fn test_repeated_signal_is_idempotent() {
        let once = ResyncCoordinator::new();
        let twice = ResyncCoordinator::new();

        assert!(once.on_signal());
        assert!(twice.on_signal());
        assert!(!twice.on_signal());

        assert_eq!(once.state(), twice.state());
        assert!(twice.on_upstream_cursor_request());
        assert!(!twice.on_upstream_cursor_request());
    }

    #[test]
    fn test_upstream_cursor_sentinel_once_per_signal() {
        let coordinator = ResyncCoordinator::new();
        assert!(!coordinator.on_upstream_cursor_request());

        let _ = coordinator.on_signal();
        assert!(coordinator.on_upstream_cursor_request());
        assert!(!coordinator.on_upstream_cursor_request());
    }

    #[test]
    fn test_state_progression() {
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();
        let _ = coordinator.on_upstream_cursor_request();
        assert_eq!(coordinator.state(), ResyncState::UpstreamRequested);

        coordinator.on_upstream_full_image_received(coordinator.signal_generation());
        assert_eq!(coordinator.state(), ResyncState::DownstreamPending);
    }

    #[test]
    fn test_image_before_cursor_request() {
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();

        coordinator.on_upstream_full_image_received(coordinator.signal_generation());
        assert_eq!(coordinator.state(), ResyncState::UpstreamReceived);
    }

    #[test]
    fn test_image_stored_across_signal_does_not_release() {
        let coordinator = ResyncCoordinator::new();
        let generation = coordinator.signal_generation();

        // The signal lands while the image is being stored.
        assert!(coordinator.on_signal());
        let _ = coordinator.on_upstream_cursor_request();
        coordinator.on_upstream_full_image_received(generation);
        assert_eq!(coordinator.state(), ResyncState::UpstreamRequested);

        coordinator.on_upstream_full_image_received(coordinator.signal_generation());
        assert_eq!(coordinator.state(), ResyncState::DownstreamPending);
    }

    #[test]
    fn test_ignored_signal_keeps_generation() {
        let coordinator = ResyncCoordinator::new();
        assert!(coordinator.on_signal());
        let generation = coordinator.signal_generation();

        assert!(!coordinator.on_signal());
        assert_eq!(coordinator.signal_generation(), generation);
    }

    #[tokio::test]
    async fn test_downstream_waits_for_upstream() {
        let (_log, forwarder) = forwarder_with(5).await;
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();
        let _ = coordinator.on_upstream_cursor_request();

        // Upstream has not delivered yet: ordinary incremental service.
        let updates = assert_ok!(
            coordinator
                .on_downstream_update_request(Sequence::new(3), &forwarder)
                .await
        );
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| !u.full_image));
        assert_eq!(coordinator.state(), ResyncState::UpstreamRequested);
    }

    #[tokio::test]
    async fn test_downstream_full_image_once_after_upstream() {
        let (_log, forwarder) = forwarder_with(5).await;
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();
        let _ = coordinator.on_upstream_cursor_request();
        coordinator.on_upstream_full_image_received(coordinator.signal_generation());

        let updates = coordinator
            .on_downstream_update_request(Sequence::new(5), &forwarder)
            .await
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].full_image);
        assert_eq!(updates[0].sequence, Sequence::new(5));
        assert_eq!(coordinator.state(), ResyncState::Idle);

        let updates = coordinator
            .on_downstream_update_request(Sequence::new(5), &forwarder)
            .await
            .unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_failed_resync_stays_pending() {
        let (log, forwarder) = forwarder_with(2).await;
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();
        coordinator.on_upstream_full_image_received(coordinator.signal_generation());

        log.set_offline(true);
        assert_err!(
            coordinator
                .on_downstream_update_request(Sequence::new(2), &forwarder)
                .await
        );
        assert_ne!(coordinator.state(), ResyncState::Idle);

        log.set_offline(false);
        let updates = coordinator
            .on_downstream_update_request(Sequence::new(2), &forwarder)
            .await
            .unwrap();
        assert!(updates[0].full_image);
    }

    struct PartialImages;

    #[async_trait]
    impl ImageRetriever<PathsUpdate> for PartialImages {
        async fn retrieve_full_image(&self) -> StoreResult<Update<PathsUpdate>> {
            Ok(Update::delta(Sequence::new(3), PathsUpdate::new()))
        }
    }

    #[tokio::test]
    async fn test_partial_image_is_a_hard_error() {
        let (log, _) = forwarder_with(3).await;
        let forwarder = UpdateForwarder::new(
            Domain::Paths,
            Arc::new(PartialImages),
            Arc::new(StoreDeltaRetriever::new(log)),
        );
        let coordinator = ResyncCoordinator::new();
        let _ = coordinator.on_signal();
        let _ = coordinator.on_upstream_cursor_request();
        coordinator.on_upstream_full_image_received(coordinator.signal_generation());

        let err = coordinator
            .on_downstream_update_request(Sequence::new(1), &forwarder)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ForwardError::IncompleteFullImage {
                domain: Domain::Paths,
                found: "a partial update",
            }
        );
        assert_eq!(coordinator.state(), ResyncState::DownstreamPending);
    }
}
