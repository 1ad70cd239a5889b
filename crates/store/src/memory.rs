use core::fmt;
use std::collections::VecDeque;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use custos_primitives::{Image, Sequence, Update};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::MetadataStore;

struct Inner<I: Image> {
    image: I,
    latest: Sequence,
    history: VecDeque<Update<I::Payload>>,
}

/// In-memory sequenced log for a single domain.
pub struct DomainLog<I: Image> {
    inner: RwLock<Inner<I>>,
    retention: usize,
    #[cfg(any(test, feature = "testing"))]
    offline: AtomicBool,
}

impl<I: Image> DomainLog<I> {
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                image: I::default(),
                latest: Sequence::UNINITIALIZED,
                history: VecDeque::with_capacity(retention.min(1024)),
            }),
            retention,
            #[cfg(any(test, feature = "testing"))]
            offline: AtomicBool::new(false),
        }
    }

    /// Runs `f` against the current image under the read lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&I) -> R) -> R {
        f(&self.inner.read().image)
    }

    /// Makes every operation fail with [`StoreError::Unavailable`] until
    /// switched back.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        #[cfg(any(test, feature = "testing"))]
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} log is offline", I::DOMAIN)));
        }

        Ok(())
    }
}

impl<I: Image> fmt::Debug for DomainLog<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();

        f.debug_struct("DomainLog")
            .field("domain", &I::DOMAIN)
            .field("latest", &inner.latest)
            .field("retained", &inner.history.len())
            .field("retention", &self.retention)
            .finish()
    }
}

#[async_trait]
impl<I: Image> MetadataStore for DomainLog<I> {
    type Image = I;

    async fn persist(&self, change: I::Payload) -> StoreResult<Sequence> {
        self.check_online()?;

        let mut inner = self.inner.write();

        let sequence = inner.latest.next();
        inner.image.apply(&change);
        inner.latest = sequence;

        if self.retention > 0 {
            if inner.history.len() >= self.retention {
                let _ = inner.history.pop_front();
            }
            inner.history.push_back(Update::delta(sequence, change));
        }

        debug!(domain = %I::DOMAIN, %sequence, "persisted delta");

        Ok(sequence)
    }

    async fn persist_full_image(&self, image: I::Payload) -> StoreResult<Sequence> {
        self.check_online()?;

        let mut inner = self.inner.write();

        let sequence = inner.latest.next();
        inner.image.restore(&image);
        inner.latest = sequence;
        inner.history.clear();

        debug!(domain = %I::DOMAIN, %sequence, "persisted full image, delta history reset");

        Ok(sequence)
    }

    async fn read_full_image(&self) -> StoreResult<(I::Payload, Sequence)> {
        self.check_online()?;

        let inner = self.inner.read();

        Ok((inner.image.snapshot(), inner.latest))
    }

    async fn read_delta(&self, from: Sequence) -> StoreResult<Vec<Update<I::Payload>>> {
        self.check_online()?;

        let inner = self.inner.read();

        if from > inner.latest {
            return Ok(Vec::new());
        }

        let oldest = inner
            .history
            .front()
            .map_or_else(|| inner.latest.next(), |update| update.sequence);

        if !from.is_initialized() || from < oldest {
            return Err(StoreError::SequenceTooOld {
                requested: from,
                oldest,
            });
        }

        Ok(inner
            .history
            .iter()
            .skip_while(|update| update.sequence < from)
            .cloned()
            .collect())
    }

    async fn latest_sequence(&self) -> StoreResult<Sequence> {
        self.check_online()?;

        Ok(self.inner.read().latest)
    }
}

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_matches};
    use custos_primitives::paths::{PathsImage, PathsUpdate};

    use super::*;

    fn add(object: &str, path: &str) -> PathsUpdate {
        let mut update = PathsUpdate::new();
        let _ = update.object(object).add_path(path);
        update
    }

    #[tokio::test]
    async fn test_sequences_start_at_one_and_increase() {
        let log = DomainLog::<PathsImage>::new(10);

        assert_eq!(log.latest_sequence().await.unwrap(), Sequence::UNINITIALIZED);
        assert_eq!(log.persist(add("a", "/a")).await.unwrap(), Sequence::new(1));
        assert_eq!(log.persist(add("b", "/b")).await.unwrap(), Sequence::new(2));
        assert_eq!(log.latest_sequence().await.unwrap(), Sequence::new(2));
    }

    #[tokio::test]
    async fn test_read_delta_is_contiguous_from_requested() {
        let log = DomainLog::<PathsImage>::new(10);
        for i in 0..5 {
            let _ = log.persist(add("a", &format!("/a/{i}"))).await.unwrap();
        }

        let delta = log.read_delta(Sequence::new(3)).await.unwrap();
        let sequences: Vec<_> = delta.iter().map(|u| u.sequence.get()).collect();

        assert_eq!(sequences, [3, 4, 5]);
        assert!(delta.iter().all(|u| !u.full_image));
    }

    #[tokio::test]
    async fn test_read_delta_past_latest_is_empty() {
        let log = DomainLog::<PathsImage>::new(10);
        let _ = log.persist(add("a", "/a")).await.unwrap();

        assert!(log.read_delta(Sequence::new(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_window_trims_history() {
        let log = DomainLog::<PathsImage>::new(2);
        for i in 0..4 {
            let _ = log.persist(add("a", &format!("/a/{i}"))).await.unwrap();
        }

        let err = log.read_delta(Sequence::new(2)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::SequenceTooOld {
                requested: Sequence::new(2),
                oldest: Sequence::new(3),
            }
        );
        assert_eq!(log.read_delta(Sequence::new(3)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_full_image_resets_history() {
        let log = DomainLog::<PathsImage>::new(10);
        let _ = log.persist(add("a", "/a")).await.unwrap();
        let _ = log.persist(add("b", "/b")).await.unwrap();

        let sequence = log.persist_full_image(add("c", "/c")).await.unwrap();
        assert_eq!(sequence, Sequence::new(3));

        assert_matches!(
            log.read_delta(Sequence::new(2)).await,
            Err(StoreError::SequenceTooOld { .. })
        );

        let (image, at) = log.read_full_image().await.unwrap();
        assert_eq!(at, Sequence::new(3));
        assert_eq!(image, add("c", "/c"));
        assert!(log.inspect(|image| image.paths("a").is_none()));
    }

    #[tokio::test]
    async fn test_zero_retention_never_serves_deltas() {
        let log = DomainLog::<PathsImage>::new(0);
        let _ = log.persist(add("a", "/a")).await.unwrap();

        assert_err!(log.read_delta(Sequence::new(1)).await);
    }

    #[tokio::test]
    async fn test_offline_log_is_unavailable() {
        let log = DomainLog::<PathsImage>::new(10);
        log.set_offline(true);

        assert_matches!(
            log.latest_sequence().await,
            Err(StoreError::Unavailable(_))
        );

        log.set_offline(false);
        assert_eq!(log.latest_sequence().await.unwrap(), Sequence::UNINITIALIZED);
    }
}
