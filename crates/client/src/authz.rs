//! Typed client for the path and permission synchronization calls.

use async_trait::async_trait;
use custos_primitives::paths::PathsUpdate;
use custos_primitives::permissions::PermissionsUpdate;
use custos_primitives::{Domain, Sequence, Update};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::channel::SecureChannelFactory;
use crate::error::{CallError, ClientError};
use crate::resilient::ResilientRpcClient;

/// Updates for both domains, each list oldest first.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AuthzUpdates {
    pub permissions: Vec<Update<PermissionsUpdate>>,
    pub paths: Vec<Update<PathsUpdate>>,
}

impl AuthzUpdates {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.paths.is_empty()
    }
}

/// Calls served by the authorization sync service over one channel.
#[async_trait]
pub trait AuthzSyncRpc: Send {
    /// Pushes a path change, or a full image, from the upstream producer.
    async fn handle_path_update(&mut self, update: Update<PathsUpdate>) -> Result<(), CallError>;

    /// Last sequence the service holds for `domain`. A zero for
    /// [`Domain::Paths`] asks the producer to push a full image.
    async fn check_last_seen(&mut self, domain: Domain) -> Result<Sequence, CallError>;

    async fn get_all_updates_from(
        &mut self,
        permissions_since: Sequence,
        paths_since: Sequence,
    ) -> Result<AuthzUpdates, CallError>;
}

#[derive(Debug)]
pub struct AuthzSyncClient<F: SecureChannelFactory> {
    client: ResilientRpcClient<F>,
}

impl<F> AuthzSyncClient<F>
where
    F: SecureChannelFactory,
    F::Channel: AuthzSyncRpc,
{
    pub const fn new(client: ResilientRpcClient<F>) -> Self {
        Self { client }
    }

    pub const fn inner(&self) -> &ResilientRpcClient<F> {
        &self.client
    }

    pub async fn notify_path_update(&self, update: Update<PathsUpdate>) -> Result<(), ClientError> {
        self.client
            .invoke("handle_path_update", move |channel| {
                let update = update.clone();
                async move { channel.handle_path_update(update).await }.boxed()
            })
            .await
    }

    pub async fn last_seen_path_sequence(&self) -> Result<Sequence, ClientError> {
        self.last_seen(Domain::Paths).await
    }

    pub async fn last_seen_permission_sequence(&self) -> Result<Sequence, ClientError> {
        self.last_seen(Domain::Permissions).await
    }

    pub async fn get_all_updates_from(
        &self,
        permissions_since: Sequence,
        paths_since: Sequence,
    ) -> Result<AuthzUpdates, ClientError> {
        self.client
            .invoke("get_all_updates_from", move |channel| {
                async move {
                    channel
                        .get_all_updates_from(permissions_since, paths_since)
                        .await
                }
                .boxed()
            })
            .await
    }

    async fn last_seen(&self, domain: Domain) -> Result<Sequence, ClientError> {
        self.client
            .invoke("check_last_seen", move |channel| {
                async move { channel.check_last_seen(domain).await }.boxed()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use custos_primitives::Endpoint;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::endpoints::EndpointSet;
    use crate::error::ChannelError;
    use crate::resilient::RetryPolicy;

    /// Shared state behind every mock channel.
    #[derive(Debug, Default)]
    struct Backend {
        received: Mutex<Vec<Update<PathsUpdate>>>,
        drop_next_calls: Mutex<u32>,
    }

    impl Backend {
        fn last_seen(&self) -> Sequence {
            self.received
                .lock()
                .unwrap()
                .last()
                .map_or(Sequence::UNINITIALIZED, |u| u.sequence)
        }
    }

    struct MockChannel(Arc<Backend>);

    impl MockChannel {
        fn flaky(&self) -> Result<(), CallError> {
            let mut remaining = self.0.drop_next_calls.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CallError::transport("connection reset by peer"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AuthzSyncRpc for MockChannel {
        async fn handle_path_update(
            &mut self,
            update: Update<PathsUpdate>,
        ) -> Result<(), CallError> {
            self.flaky()?;
            self.0.received.lock().unwrap().push(update);
            Ok(())
        }

        async fn check_last_seen(&mut self, domain: Domain) -> Result<Sequence, CallError> {
            self.flaky()?;
            Ok(match domain {
                Domain::Paths => self.0.last_seen(),
                Domain::Permissions => Sequence::new(7),
            })
        }

        async fn get_all_updates_from(
            &mut self,
            _permissions_since: Sequence,
            paths_since: Sequence,
        ) -> Result<AuthzUpdates, CallError> {
            self.flaky()?;
            let paths = self
                .0
                .received
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.sequence > paths_since)
                .cloned()
                .collect();
            Ok(AuthzUpdates {
                permissions: Vec::new(),
                paths,
            })
        }
    }

    struct Factory(Arc<Backend>);

    #[async_trait]
    impl SecureChannelFactory for Factory {
        type Channel = MockChannel;

        async fn open(&self, _endpoint: &Endpoint) -> Result<MockChannel, ChannelError> {
            Ok(MockChannel(Arc::clone(&self.0)))
        }
    }

    fn sync_client(backend: &Arc<Backend>) -> AuthzSyncClient<Factory> {
        let endpoints = EndpointSet::with_rng(
            vec![Endpoint::new("a", 8038), Endpoint::new("b", 8038)],
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        AuthzSyncClient::new(ResilientRpcClient::new(
            Factory(Arc::clone(backend)),
            endpoints,
            RetryPolicy::default(),
        ))
    }

    fn path_update(sequence: i64, path: &str) -> Update<PathsUpdate> {
        let mut payload = PathsUpdate::new();
        let _ = payload.object("db.tbl").add_path(path);
        Update::delta(Sequence::new(sequence), payload)
    }

    #[tokio::test]
    async fn test_push_then_read_back() {
        let backend = Arc::new(Backend::default());
        let client = sync_client(&backend);

        assert_eq!(client.last_seen_path_sequence().await.unwrap(), Sequence::UNINITIALIZED);

        client.notify_path_update(path_update(1, "/a")).await.unwrap();
        client.notify_path_update(path_update(2, "/b")).await.unwrap();

        assert_eq!(client.last_seen_path_sequence().await.unwrap(), Sequence::new(2));
        assert_eq!(client.last_seen_permission_sequence().await.unwrap(), Sequence::new(7));

        let updates = client
            .get_all_updates_from(Sequence::new(7), Sequence::new(1))
            .await
            .unwrap();
        assert_eq!(updates.paths, [path_update(2, "/b")]);
        assert!(updates.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_update_is_resent_after_transport_failure() {
        let backend = Arc::new(Backend::default());
        *backend.drop_next_calls.lock().unwrap() = 2;
        let client = sync_client(&backend);

        client.notify_path_update(path_update(1, "/a")).await.unwrap();

        assert_eq!(*backend.received.lock().unwrap(), [path_update(1, "/a")]);
        assert_eq!(client.inner().connection_attempts(), 3);
    }
}
