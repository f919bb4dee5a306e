//! Release-on-drop for an owned execution slot.
//!
//! An async caller holding Execute can be dropped at any await point, for
//! example when an HTTP client disconnects. The guard turns that drop into a
//! background `release` so the key does not stay blocked until it expires.

use tokio::runtime::Handle;

use crate::service::IdempotencyService;
use crate::types::IdempotencyRequest;

/// Releases the slot of `request` when dropped while still armed.
///
/// Call [`ReleaseGuard::disarm`] once `complete` or `release` has returned.
#[must_use = "dropping the guard immediately releases the slot"]
#[derive(Debug)]
pub struct ReleaseGuard {
    service: IdempotencyService,
    request: Option<IdempotencyRequest>,
}

impl ReleaseGuard {
    pub(crate) fn new(service: IdempotencyService, request: IdempotencyRequest) -> Self {
        Self {
            service,
            request: Some(request),
        }
    }

    /// The owner settled the slot itself; dropping no longer releases.
    pub fn disarm(mut self) {
        self.request = None;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.request.is_some()
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(request) = self.request.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(key = %request.key, "Owner dropped before settling; releasing in background");
                let service = self.service.clone();
                handle.spawn(async move {
                    service.release_abandoned(&request).await;
                });
            }
            Err(_) => tracing::warn!(
                key = %request.key,
                "Owner dropped outside a runtime; key blocked until expiry"
            ),
        }
    }
}
