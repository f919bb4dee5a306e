//! Store trait and the tracing decorator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::decision::IdempotencyClaim;
use crate::error::Result;
use crate::types::{IdempotencyData, IdempotencyKey, RequestFingerprint};

/// Trait for idempotency storage backends.
///
/// `claim` is the only operation that needs true mutual exclusion: for a
/// given key, concurrent calls must produce exactly one owner.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Create an in-progress record if none exists (or the existing one has
    /// expired) and report ownership, otherwise report the stored record.
    async fn claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<IdempotencyClaim>;

    /// Mark the record completed with `data`.
    ///
    /// No-op unless the record exists, is in progress, has not expired and
    /// carries `fingerprint`.
    async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
        data: &IdempotencyData,
    ) -> Result<()>;

    /// Delete the record if it is in progress and carries `fingerprint`.
    async fn release(&self, key: &IdempotencyKey, fingerprint: &RequestFingerprint)
    -> Result<()>;
}

#[async_trait]
impl<S: IdempotencyStore + ?Sized> IdempotencyStore for Arc<S> {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<IdempotencyClaim> {
        (**self).claim(key, fingerprint).await
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
        data: &IdempotencyData,
    ) -> Result<()> {
        (**self).complete(key, fingerprint, data).await
    }

    async fn release(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<()> {
        (**self).release(key, fingerprint).await
    }
}

/// A wrapper that adds tracing to a store.
pub struct TracingStore<S: IdempotencyStore> {
    inner: S,
}

impl<S: IdempotencyStore> TracingStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: IdempotencyStore> IdempotencyStore for TracingStore<S> {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<IdempotencyClaim> {
        tracing::debug!(key = %key, "Claiming idempotency key");
        let result = self.inner.claim(key, fingerprint).await;
        match &result {
            Ok(claim) => tracing::trace!(
                key = %key,
                is_owner = claim.is_owner,
                status = %claim.status,
                "Claim settled"
            ),
            Err(err) => tracing::debug!(key = %key, error = %err, "Claim failed"),
        }
        result
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
        data: &IdempotencyData,
    ) -> Result<()> {
        tracing::debug!(key = %key, entries = data.len(), "Completing idempotency key");
        self.inner.complete(key, fingerprint, data).await
    }

    async fn release(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<()> {
        tracing::debug!(key = %key, "Releasing idempotency key");
        self.inner.release(key, fingerprint).await
    }
}
