//! Coordination service: claim, decide, then complete or release.
//!
//! The service is the only source of [`IdempotencyDecision::Execute`]. A
//! caller that receives Execute must follow up with exactly one of
//! [`IdempotencyService::complete`] or [`IdempotencyService::release`].

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::cancel::CancelSignal;
use crate::decision::{IdempotencyDecision, RejectReason, decide};
use crate::error::{Error, Result};
use crate::guard::ReleaseGuard;
use crate::store::IdempotencyStore;
use crate::types::{IdempotencyData, IdempotencyRequest};

/// Orchestrates a store and the decision maker. Cheap to clone.
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
}

impl std::fmt::Debug for IdempotencyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyService").finish_non_exhaustive()
    }
}

impl IdempotencyService {
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    /// Build a service that owns `store`.
    pub fn from_store<S: IdempotencyStore + 'static>(store: S) -> Self {
        Self::new(Arc::new(store))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdempotencyStore> {
        &self.store
    }

    /// Claim the request's key and decide what the caller should do.
    ///
    /// A claim already sent to the store is allowed to settle. If the caller
    /// was cancelled meanwhile and became owner, the record is released
    /// before `Cancelled` is returned, so no ownerless record survives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired, or
    /// [`Error::StoreUnavailable`] if the store failed.
    pub async fn decide(
        &self,
        request: &IdempotencyRequest,
        cancel: &CancelSignal,
    ) -> Result<IdempotencyDecision> {
        if cancel.is_cancelled() {
            tracing::debug!(key = %request.key, "Decide cancelled before claim");
            return Err(Error::cancelled("decide"));
        }

        let claim = self
            .store
            .claim(&request.key, &request.fingerprint)
            .await?;

        if cancel.is_cancelled() {
            if claim.is_owner {
                self.release_abandoned(request).await;
            }
            tracing::debug!(key = %request.key, "Decide cancelled after claim");
            return Err(Error::cancelled("decide"));
        }

        let decision = decide(request, &claim);
        log_decision(request, &decision);
        Ok(decision)
    }

    /// Like [`IdempotencyService::decide`], but the claim runs on its own
    /// task and survives the caller being dropped.
    ///
    /// If nobody is left to receive an Execute, the slot is released right
    /// away. Pair with [`IdempotencyService::release_guard`], created before
    /// the next await, to cover the rest of the execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store failed, or
    /// [`Error::Cancelled`] if the claim task died.
    pub async fn decide_detached(&self, request: &IdempotencyRequest) -> Result<IdempotencyDecision> {
        let (tx, rx) = oneshot::channel();
        let service = self.clone();
        let owned = request.clone();
        tokio::spawn(async move {
            let outcome = service.decide(&owned, &CancelSignal::never()).await;
            if let Err(Ok(IdempotencyDecision::Execute)) = tx.send(outcome) {
                tracing::debug!(key = %owned.key, "Caller gone before Execute was delivered");
                service.release_abandoned(&owned).await;
            }
        });
        rx.await.map_err(|_| Error::cancelled("decide"))?
    }

    /// A guard that releases `request`'s slot if dropped before
    /// [`ReleaseGuard::disarm`].
    pub fn release_guard(&self, request: &IdempotencyRequest) -> ReleaseGuard {
        ReleaseGuard::new(self.clone(), request.clone())
    }

    /// Record the owner's result so later requests replay it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired first (the record may
    /// be unchanged and the call may be retried), or
    /// [`Error::StoreUnavailable`] if the store failed.
    pub async fn complete(
        &self,
        request: &IdempotencyRequest,
        data: &IdempotencyData,
        cancel: &CancelSignal,
    ) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::cancelled("complete")),
            result = self.store.complete(&request.key, &request.fingerprint, data) => {
                if result.is_ok() {
                    tracing::debug!(key = %request.key, entries = data.len(), "Idempotent result recorded");
                }
                result
            }
        }
    }

    /// Give up the execution slot so the next request can execute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired first, or
    /// [`Error::StoreUnavailable`] if the store failed.
    pub async fn release(&self, request: &IdempotencyRequest, cancel: &CancelSignal) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::cancelled("release")),
            result = self.store.release(&request.key, &request.fingerprint) => {
                if result.is_ok() {
                    tracing::debug!(key = %request.key, "Idempotency slot released");
                }
                result
            }
        }
    }

    pub(crate) async fn release_abandoned(&self, request: &IdempotencyRequest) {
        if let Err(err) = self
            .store
            .release(&request.key, &request.fingerprint)
            .await
        {
            tracing::warn!(
                key = %request.key,
                error = %err,
                "Failed to release claim abandoned by cancellation; key blocked until expiry"
            );
        }
    }
}

fn log_decision(request: &IdempotencyRequest, decision: &IdempotencyDecision) {
    match decision {
        IdempotencyDecision::Reject(RejectReason::InconsistentRecord) => tracing::warn!(
            key = %request.key,
            reason = %RejectReason::InconsistentRecord,
            "Completed record has no result data"
        ),
        IdempotencyDecision::Reject(reason) => tracing::info!(
            key = %request.key,
            decision = %decision.kind(),
            reason = %reason,
            "Idempotent request rejected"
        ),
        IdempotencyDecision::Execute | IdempotencyDecision::Replay(_) => tracing::debug!(
            key = %request.key,
            decision = %decision.kind(),
            "Idempotency decision"
        ),
    }
}
