//! Process-local store backed by a sharded concurrent map.
//!
//! `claim` goes through the map's entry API, so the existence check and the
//! insert happen under one shard lock: exactly one caller wins per key.
//! Records live for the process lifetime unless a TTL is configured, in
//! which case expired records are treated as absent on claim and can be
//! dropped eagerly with [`InMemoryStore::purge_expired`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::decision::IdempotencyClaim;
use crate::error::Result;
use crate::store::IdempotencyStore;
use crate::types::{IdempotencyData, IdempotencyKey, IdempotencyStatus, RequestFingerprint};

#[derive(Debug, Clone)]
struct MemoryRecord {
    fingerprint: RequestFingerprint,
    status: IdempotencyStatus,
    data: Option<IdempotencyData>,
    expires_at: Option<Instant>,
}

impl MemoryRecord {
    fn in_progress(fingerprint: RequestFingerprint, ttl: Option<Duration>) -> Self {
        Self {
            fingerprint,
            status: IdempotencyStatus::InProgress,
            data: None,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn to_claim(&self) -> IdempotencyClaim {
        IdempotencyClaim::existing(self.status, self.fingerprint.clone(), self.data.clone())
    }
}

/// In-memory idempotency store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<IdempotencyKey, MemoryRecord>,
    ttl: Option<Duration>,
}

impl InMemoryStore {
    /// Create a store whose records never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose records expire `ttl` after they are claimed.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Create a new in-memory store wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of records currently held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every expired record and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.records.len())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<IdempotencyClaim> {
        let now = Instant::now();
        let fresh = MemoryRecord::in_progress(fingerprint.clone(), self.ttl);

        let claim = match self.records.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                IdempotencyClaim::owned(fingerprint.clone())
            }
            Entry::Occupied(mut slot) if slot.get().is_expired(now) => {
                tracing::trace!(key = %key, "Replacing expired record");
                slot.insert(fresh);
                IdempotencyClaim::owned(fingerprint.clone())
            }
            Entry::Occupied(slot) => slot.get().to_claim(),
        };

        Ok(claim)
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
        data: &IdempotencyData,
    ) -> Result<()> {
        let now = Instant::now();
        match self.records.get_mut(key) {
            Some(mut record)
                if record.status == IdempotencyStatus::InProgress
                    && record.fingerprint == *fingerprint
                    && !record.is_expired(now) =>
            {
                record.status = IdempotencyStatus::Completed;
                record.data = Some(data.clone());
            }
            Some(_) => tracing::debug!(key = %key, "Completion skipped: record not claimable"),
            None => tracing::debug!(key = %key, "Completion skipped: record missing"),
        }
        Ok(())
    }

    async fn release(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<()> {
        let removed = self.records.remove_if(key, |_, record| {
            record.status == IdempotencyStatus::InProgress && record.fingerprint == *fingerprint
        });
        if removed.is_none() {
            tracing::debug!(key = %key, "Release skipped: no matching in-progress record");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Result<IdempotencyKey> {
        IdempotencyKey::new("u1", "orders", k)
    }

    fn fp(s: &str) -> RequestFingerprint {
        RequestFingerprint::new(s)
    }

    #[tokio::test]
    async fn test_first_claim_owns_second_observes() -> Result<()> {
        let store = InMemoryStore::new();

        let first = store.claim(&key("abc")?, &fp("f1")).await?;
        let second = store.claim(&key("abc")?, &fp("f2")).await?;

        assert!(first.is_owner);
        assert!(!second.is_owner);
        assert_eq!(second.status, IdempotencyStatus::InProgress);
        assert_eq!(second.stored_fingerprint, fp("f1"), "stored, not caller's");
        assert!(second.data.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_keys_are_independent() -> Result<()> {
        let store = InMemoryStore::new();
        assert!(store.claim(&key("a")?, &fp("f1")).await?.is_owner);
        assert!(store.claim(&key("b")?, &fp("f1")).await?.is_owner);

        let other_scope = IdempotencyKey::new("u1", "payments", "a")?;
        assert!(store.claim(&other_scope, &fp("f1")).await?.is_owner);
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_exposes_data_on_next_claim() -> Result<()> {
        let store = InMemoryStore::new();
        let data = IdempotencyData::new().with("body", "created");

        store.claim(&key("abc")?, &fp("f1")).await?;
        store.complete(&key("abc")?, &fp("f1"), &data).await?;

        let claim = store.claim(&key("abc")?, &fp("f1")).await?;
        assert!(!claim.is_owner);
        assert_eq!(claim.status, IdempotencyStatus::Completed);
        assert_eq!(claim.data, Some(data));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_missing_record_is_noop() -> Result<()> {
        let store = InMemoryStore::new();
        let data = IdempotencyData::new().with("body", "x");
        store.complete(&key("ghost")?, &fp("f1"), &data).await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_with_foreign_fingerprint_is_noop() -> Result<()> {
        let store = InMemoryStore::new();
        let data = IdempotencyData::new().with("body", "x");

        store.claim(&key("abc")?, &fp("f1")).await?;
        store.complete(&key("abc")?, &fp("f2"), &data).await?;

        let claim = store.claim(&key("abc")?, &fp("f1")).await?;
        assert_eq!(claim.status, IdempotencyStatus::InProgress);
        Ok(())
    }

    #[tokio::test]
    async fn test_data_is_set_once() -> Result<()> {
        let store = InMemoryStore::new();
        let first = IdempotencyData::new().with("body", "first");
        let second = IdempotencyData::new().with("body", "second");

        store.claim(&key("abc")?, &fp("f1")).await?;
        store.complete(&key("abc")?, &fp("f1"), &first).await?;
        store.complete(&key("abc")?, &fp("f1"), &second).await?;

        let claim = store.claim(&key("abc")?, &fp("f1")).await?;
        assert_eq!(claim.data, Some(first));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_requires_matching_fingerprint() -> Result<()> {
        let store = InMemoryStore::new();
        store.claim(&key("abc")?, &fp("f1")).await?;

        store.release(&key("abc")?, &fp("f2")).await?;
        assert_eq!(store.len(), 1);

        store.release(&key("abc")?, &fp("f1")).await?;
        assert!(store.is_empty());

        store.release(&key("abc")?, &fp("f1")).await?;
        assert!(store.is_empty(), "repeated release is a no-op");
        Ok(())
    }

    #[tokio::test]
    async fn test_release_keeps_completed_record() -> Result<()> {
        let store = InMemoryStore::new();
        store.claim(&key("abc")?, &fp("f1")).await?;
        store
            .complete(&key("abc")?, &fp("f1"), &IdempotencyData::new().with("body", "x"))
            .await?;

        store.release(&key("abc")?, &fp("f1")).await?;
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_record_is_reclaimable() -> Result<()> {
        let store = InMemoryStore::with_ttl(Duration::from_millis(20));
        store.claim(&key("abc")?, &fp("f1")).await?;

        tokio::time::sleep(Duration::from_millis(40)).await;

        let claim = store.claim(&key("abc")?, &fp("f2")).await?;
        assert!(claim.is_owner);
        assert_eq!(claim.stored_fingerprint, fp("f2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_record_cannot_be_completed() -> Result<()> {
        let store = InMemoryStore::with_ttl(Duration::from_millis(20));
        store.claim(&key("abc")?, &fp("f1")).await?;
        tokio::time::sleep(Duration::from_millis(40)).await;

        store
            .complete(&key("abc")?, &fp("f1"), &IdempotencyData::new().with("body", "late"))
            .await?;
        assert!(store.claim(&key("abc")?, &fp("f1")).await?.is_owner);
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_expired() -> Result<()> {
        let store = InMemoryStore::with_ttl(Duration::from_millis(20));
        store.claim(&key("old")?, &fp("f1")).await?;
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.claim(&key("new")?, &fp("f1")).await?;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_without_ttl_nothing_expires() -> Result<()> {
        let store = InMemoryStore::new();
        store.claim(&key("abc")?, &fp("f1")).await?;
        assert_eq!(store.purge_expired(), 0);
        assert!(store.ttl().is_none());
        Ok(())
    }
}
