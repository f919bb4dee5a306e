//! Background deletion of expired records.
//!
//! Expired records already behave as absent on claim; the sweeper only keeps
//! storage from growing with dead keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::memory::InMemoryStore;

/// A store that can physically delete its expired records.
#[async_trait]
pub trait PurgeExpired: Send + Sync {
    /// Delete every expired record and return how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

#[async_trait]
impl PurgeExpired for InMemoryStore {
    async fn purge_expired(&self) -> Result<usize> {
        Ok(Self::purge_expired(self))
    }
}

#[async_trait]
impl<P: PurgeExpired + ?Sized> PurgeExpired for Arc<P> {
    async fn purge_expired(&self) -> Result<usize> {
        (**self).purge_expired().await
    }
}

/// Spawn a task that calls `purge_expired` every `interval` until `shutdown`
/// flips to `true` or its sender is dropped.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_expiry_sweeper<P>(
    store: Arc<P>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    P: PurgeExpired + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::info!(interval_ms = interval.as_millis(), "Expiry sweeper started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match store.purge_expired().await {
                        Ok(0) => tracing::trace!("Expiry sweep found nothing"),
                        Ok(removed) => tracing::debug!(removed, "Expired idempotency records purged"),
                        Err(err) => tracing::warn!(error = %err, "Expiry sweep failed"),
                    }
                }
            }
        }
        tracing::info!("Expiry sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IdempotencyStore;
    use crate::types::{IdempotencyKey, RequestFingerprint};

    #[tokio::test]
    async fn test_sweeper_purges_and_stops() -> Result<()> {
        let store = Arc::new(InMemoryStore::with_ttl(Duration::from_millis(10)));
        let key = IdempotencyKey::new("u1", "orders", "abc")?;
        store.claim(&key, &RequestFingerprint::new("f1")).await?;
        assert_eq!(store.len(), 1);

        let (tx, rx) = watch::channel(false);
        let handle = spawn_expiry_sweeper(store.clone(), Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.is_empty());

        tx.send_replace(true);
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(stopped, Ok(Ok(()))));
        Ok(())
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let store = Arc::new(InMemoryStore::new());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_expiry_sweeper(store, Duration::from_secs(60), rx);

        drop(tx);
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
