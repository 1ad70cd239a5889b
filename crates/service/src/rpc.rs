use core::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use custos_client::{AuthzSyncRpc, AuthzUpdates, CallError};
use custos_primitives::paths::PathsUpdate;
use custos_primitives::{Domain, Sequence, Update};

use crate::AuthzSyncService;

/// In-process channel to a shared service; a wire transport wraps the same
/// calls.
#[derive(Clone, Debug)]
pub struct ServiceChannel(Arc<AuthzSyncService>);

impl ServiceChannel {
    #[must_use]
    pub const fn new(service: Arc<AuthzSyncService>) -> Self {
        Self(service)
    }

    #[must_use]
    pub const fn service(&self) -> &Arc<AuthzSyncService> {
        &self.0
    }
}

impl Deref for ServiceChannel {
    type Target = AuthzSyncService;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Arc<AuthzSyncService>> for ServiceChannel {
    fn from(service: Arc<AuthzSyncService>) -> Self {
        Self::new(service)
    }
}

#[async_trait]
impl AuthzSyncRpc for ServiceChannel {
    async fn handle_path_update(&mut self, update: Update<PathsUpdate>) -> Result<(), CallError> {
        let _ = self.0.handle_path_update(update).await?;
        Ok(())
    }

    async fn check_last_seen(&mut self, domain: Domain) -> Result<Sequence, CallError> {
        Ok(self.0.check_last_seen(domain).await?)
    }

    async fn get_all_updates_from(
        &mut self,
        permissions_since: Sequence,
        paths_since: Sequence,
    ) -> Result<AuthzUpdates, CallError> {
        Ok(self
            .0
            .get_all_updates_from(permissions_since, paths_since)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use custos_config::ServiceConfig;

    use super::*;

    fn channel() -> ServiceChannel {
        ServiceChannel::from(Arc::new(AuthzSyncService::from_config(
            &ServiceConfig::default(),
        )))
    }

    #[tokio::test]
    async fn test_calls_reach_the_shared_service() {
        let mut channel = channel();
        let observer = channel.clone();

        let mut update = PathsUpdate::new();
        let _ = update.object("db.tbl").add_path("/data/db/tbl");
        channel
            .handle_path_update(Update::delta(Sequence::new(1), update))
            .await
            .unwrap();

        assert_eq!(
            observer.service().check_last_seen(Domain::Paths).await.unwrap(),
            Sequence::new(1)
        );
        assert_eq!(
            AuthzSyncRpc::check_last_seen(&mut channel, Domain::Paths)
                .await
                .unwrap(),
            Sequence::new(1)
        );

        let updates = AuthzSyncRpc::get_all_updates_from(
            &mut channel,
            Sequence::UNINITIALIZED,
            Sequence::UNINITIALIZED,
        )
        .await
        .unwrap();
        assert_eq!(updates.paths.len(), 1);
        assert!(updates.paths[0].full_image);
    }

    #[tokio::test]
    async fn test_store_outage_is_a_transport_failure() {
        let mut channel = channel();
        channel.service().store().paths().set_offline(true);

        let err = AuthzSyncRpc::get_all_updates_from(
            &mut channel,
            Sequence::UNINITIALIZED,
            Sequence::new(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CallError::Transport(_)));
    }
}
