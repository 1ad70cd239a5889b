//! The authorization sync service.
//!
//! Sits between an upstream producer of path metadata and downstream
//! consumers that enforce permissions. Path changes are pushed in by the
//! producer, permission changes arrive through the hooks in [`hooks`], and
//! consumers poll both domains with their last-seen sequence numbers.

use std::sync::Arc;

use custos_client::AuthzUpdates;
use custos_config::ServiceConfig;
use custos_primitives::paths::PathsUpdate;
use custos_primitives::permissions::PermissionsUpdate;
use custos_primitives::{Domain, Sequence, Update};
use custos_store::{InMemoryStore, MetadataStore};
use custos_sync::{ResyncCoordinator, UpdateForwarder};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod error;
pub mod hooks;
mod rpc;
pub mod signal;

pub use error::ServiceError;
pub use hooks::{Authorizable, Privilege, PrivilegeScope};
pub use rpc::ServiceChannel;

/// What happened to a pushed path update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathUpdateOutcome {
    /// A full image replaced the paths domain.
    Replaced { upstream: Sequence, local: Sequence },
    /// A delta was applied.
    Applied { upstream: Sequence, local: Sequence },
    /// The update was already seen.
    Duplicate { upstream: Sequence },
    /// Updates between the last seen one and this one are missing; dropped.
    Gap { expected: Sequence, received: Sequence },
}

pub struct AuthzSyncService {
    store: InMemoryStore,
    paths: UpdateForwarder<PathsUpdate>,
    permissions: UpdateForwarder<PermissionsUpdate>,
    coordinator: ResyncCoordinator,
    upstream_cursor: Mutex<Sequence>,
}

impl AuthzSyncService {
    #[must_use]
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            paths: UpdateForwarder::from_store(store.paths()),
            permissions: UpdateForwarder::from_store(store.permissions()),
            store,
            coordinator: ResyncCoordinator::new(),
            upstream_cursor: Mutex::new(Sequence::UNINITIALIZED),
        }
    }

    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(InMemoryStore::new(config.store()))
    }

    /// Builds the service and subscribes it to the configured resync signals.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn launch(config: &ServiceConfig) -> Arc<Self> {
        let service = Arc::new(Self::from_config(config));

        let listeners = signal::spawn_signal_listener(&service, &config.resync_signals);
        info!(
            listeners = listeners.len(),
            retention = config.delta_retention,
            "authorization sync service started"
        );

        service
    }

    pub const fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub const fn coordinator(&self) -> &ResyncCoordinator {
        &self.coordinator
    }

    /// Forces a full resync of both hops.
    ///
    /// Returns `false` when a resync was already in progress and the signal
    /// was folded into it.
    pub fn on_signal(&self, name: &str) -> bool {
        let triggered = self.coordinator.on_signal();

        if triggered {
            info!(signal = name, "received signal, triggering full resync");
        } else {
            debug!(signal = name, "received signal, full resync already in progress");
        }

        triggered
    }

    /// Accepts a path update from the upstream producer.
    ///
    /// Deltas must arrive in order: the only delta applied is the one
    /// directly after the last seen upstream sequence. The producer learns
    /// about a gap through [`check_last_seen`](Self::check_last_seen) and
    /// answers with a full image.
    pub async fn handle_path_update(
        &self,
        update: Update<PathsUpdate>,
    ) -> Result<PathUpdateOutcome, ServiceError> {
        let mut cursor = self.upstream_cursor.lock().await;
        let upstream = update.sequence;

        if update.is_full_image() {
            let generation = self.coordinator.signal_generation();
            let local = self.store.paths().persist_full_image(update.payload).await?;
            *cursor = upstream;

            info!(%upstream, %local, "received full path image from upstream");
            self.coordinator.on_upstream_full_image_received(generation);

            return Ok(PathUpdateOutcome::Replaced { upstream, local });
        }

        let expected = cursor.next();

        if upstream < expected {
            debug!(%upstream, last_seen = %cursor, "ignoring duplicate path update");
            return Ok(PathUpdateOutcome::Duplicate { upstream });
        }

        if upstream > expected {
            warn!(%expected, received = %upstream, "gap in upstream path updates, dropping update");
            return Ok(PathUpdateOutcome::Gap {
                expected,
                received: upstream,
            });
        }

        let local = self.store.paths().persist(update.payload).await?;
        *cursor = upstream;

        debug!(%upstream, %local, "applied path update");

        Ok(PathUpdateOutcome::Applied { upstream, local })
    }

    /// Sequence the producer of `domain` should continue from.
    ///
    /// For [`Domain::Paths`] this is the last upstream sequence applied, or
    /// [`Sequence::UNINITIALIZED`] once per forced resync.
    pub async fn check_last_seen(&self, domain: Domain) -> Result<Sequence, ServiceError> {
        match domain {
            Domain::Paths => {
                if self.coordinator.on_upstream_cursor_request() {
                    return Ok(Sequence::UNINITIALIZED);
                }

                Ok(*self.upstream_cursor.lock().await)
            }
            Domain::Permissions => Ok(self.permissions.latest_sequence().await?),
        }
    }

    /// Updates of one domain since `since`; the other list stays empty.
    pub async fn get_updates_since(
        &self,
        domain: Domain,
        since: Sequence,
    ) -> Result<AuthzUpdates, ServiceError> {
        let mut updates = AuthzUpdates::default();

        match domain {
            Domain::Paths => updates.paths = self.path_updates_since(since).await?,
            Domain::Permissions => {
                updates.permissions = self.permissions.get_updates_since(since).await?;
            }
        }

        Ok(updates)
    }

    pub async fn get_all_updates_from(
        &self,
        permissions_since: Sequence,
        paths_since: Sequence,
    ) -> Result<AuthzUpdates, ServiceError> {
        let permissions = self.permissions.get_updates_since(permissions_since).await?;
        let paths = self.path_updates_since(paths_since).await?;

        debug!(
            %permissions_since,
            %paths_since,
            permissions = permissions.len(),
            paths = paths.len(),
            "serving updates"
        );

        Ok(AuthzUpdates { permissions, paths })
    }

    async fn path_updates_since(
        &self,
        since: Sequence,
    ) -> Result<Vec<Update<PathsUpdate>>, ServiceError> {
        Ok(self
            .coordinator
            .on_downstream_update_request(since, &self.paths)
            .await?)
    }
}

impl core::fmt::Debug for AuthzSyncService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthzSyncService")
            .field("store", &self.store)
            .field("resync", &self.coordinator.state())
            .finish_non_exhaustive()
    }
}
