//! Claim outcomes and the pure decision step.
//!
//! # Ordering
//!
//! ```text
//! fingerprint mismatch  -> Reject(FingerprintMismatch)
//! completed + data      -> Replay(data)
//! completed, no data    -> Reject(InconsistentRecord)
//! not owner             -> Reject(InFlight)
//! otherwise             -> Execute
//! ```
//!
//! A mismatch is a client error independent of timing, so it is checked
//! before status or ownership can mask it.

use std::fmt;

use crate::types::{IdempotencyData, IdempotencyRequest, IdempotencyStatus, RequestFingerprint};

/// What a store observed when asked to claim a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyClaim {
    /// This call created the record and holds the execution slot.
    pub is_owner: bool,
    pub status: IdempotencyStatus,
    /// Fingerprint persisted with the record, not the caller's.
    pub stored_fingerprint: RequestFingerprint,
    /// Present only for completed records.
    pub data: Option<IdempotencyData>,
}

impl IdempotencyClaim {
    /// The caller won the race and now owns an in-progress record.
    #[must_use]
    pub const fn owned(fingerprint: RequestFingerprint) -> Self {
        Self {
            is_owner: true,
            status: IdempotencyStatus::InProgress,
            stored_fingerprint: fingerprint,
            data: None,
        }
    }

    /// A record already existed. Data is dropped unless it is completed.
    #[must_use]
    pub fn existing(
        status: IdempotencyStatus,
        stored_fingerprint: RequestFingerprint,
        data: Option<IdempotencyData>,
    ) -> Self {
        let data = match status {
            IdempotencyStatus::Completed => data,
            IdempotencyStatus::InProgress => None,
        };
        Self {
            is_owner: false,
            status,
            stored_fingerprint,
            data,
        }
    }
}

/// Why a request was turned away. Diagnostic only; never shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The key was reused with a different payload.
    FingerprintMismatch,
    /// Completed record without a result snapshot.
    InconsistentRecord,
    /// Another caller currently owns the slot.
    InFlight,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FingerprintMismatch => write!(f, "fingerprint_mismatch"),
            Self::InconsistentRecord => write!(f, "inconsistent_record"),
            Self::InFlight => write!(f, "in_flight"),
        }
    }
}

/// Discriminant of [`IdempotencyDecision`], handy for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Execute,
    Reject,
    Replay,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Reject => write!(f, "reject"),
            Self::Replay => write!(f, "replay"),
        }
    }
}

/// Outcome handed back to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyDecision {
    /// Run the operation, then complete or release.
    Execute,
    /// Refuse without running the operation.
    Reject(RejectReason),
    /// Serve the stored result without running the operation.
    Replay(IdempotencyData),
}

impl IdempotencyDecision {
    #[must_use]
    pub const fn kind(&self) -> DecisionKind {
        match self {
            Self::Execute => DecisionKind::Execute,
            Self::Reject(_) => DecisionKind::Reject,
            Self::Replay(_) => DecisionKind::Replay,
        }
    }

    #[must_use]
    pub const fn cached_data(&self) -> Option<&IdempotencyData> {
        match self {
            Self::Replay(data) => Some(data),
            Self::Execute | Self::Reject(_) => None,
        }
    }

    #[must_use]
    pub const fn is_execute(&self) -> bool {
        matches!(self, Self::Execute)
    }
}

/// Map a claim outcome to a decision. Total: never fails.
#[must_use]
pub fn decide(request: &IdempotencyRequest, claim: &IdempotencyClaim) -> IdempotencyDecision {
    if claim.stored_fingerprint != request.fingerprint {
        return IdempotencyDecision::Reject(RejectReason::FingerprintMismatch);
    }

    if claim.status == IdempotencyStatus::Completed {
        return claim.data.clone().map_or(
            IdempotencyDecision::Reject(RejectReason::InconsistentRecord),
            IdempotencyDecision::Replay,
        );
    }

    if !claim.is_owner {
        return IdempotencyDecision::Reject(RejectReason::InFlight);
    }

    IdempotencyDecision::Execute
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::IdempotencyKey;

    fn request(fingerprint: &str) -> Result<IdempotencyRequest> {
        Ok(IdempotencyRequest::new(
            IdempotencyKey::new("user", "orders", "1")?,
            RequestFingerprint::new(fingerprint),
        ))
    }

    fn data() -> IdempotencyData {
        IdempotencyData::new().with("body", "ok")
    }

    #[test]
    fn test_owner_with_matching_fingerprint_executes() -> Result<()> {
        let claim = IdempotencyClaim::owned(RequestFingerprint::new("ff01"));
        assert_eq!(decide(&request("ff01")?, &claim), IdempotencyDecision::Execute);
        Ok(())
    }

    #[test]
    fn test_mismatch_beats_completed_data() -> Result<()> {
        let claim = IdempotencyClaim::existing(
            IdempotencyStatus::Completed,
            RequestFingerprint::new("ff01"),
            Some(data()),
        );
        assert_eq!(
            decide(&request("ff02")?, &claim),
            IdempotencyDecision::Reject(RejectReason::FingerprintMismatch)
        );
        Ok(())
    }

    #[test]
    fn test_mismatch_beats_ownership() -> Result<()> {
        let claim = IdempotencyClaim::owned(RequestFingerprint::new("ff01"));
        assert_eq!(
            decide(&request("ff02")?, &claim),
            IdempotencyDecision::Reject(RejectReason::FingerprintMismatch)
        );
        Ok(())
    }

    #[test]
    fn test_completed_with_data_replays() -> Result<()> {
        let claim = IdempotencyClaim::existing(
            IdempotencyStatus::Completed,
            RequestFingerprint::new("ff01"),
            Some(data()),
        );
        let decision = decide(&request("ff01")?, &claim);
        assert_eq!(decision.kind(), DecisionKind::Replay);
        assert_eq!(decision.cached_data(), Some(&data()));
        Ok(())
    }

    #[test]
    fn test_completed_without_data_is_rejected() -> Result<()> {
        let claim = IdempotencyClaim {
            is_owner: false,
            status: IdempotencyStatus::Completed,
            stored_fingerprint: RequestFingerprint::new("ff01"),
            data: None,
        };
        assert_eq!(
            decide(&request("ff01")?, &claim),
            IdempotencyDecision::Reject(RejectReason::InconsistentRecord)
        );
        Ok(())
    }

    #[test]
    fn test_in_flight_non_owner_is_rejected() -> Result<()> {
        let claim = IdempotencyClaim::existing(
            IdempotencyStatus::InProgress,
            RequestFingerprint::new("ff01"),
            None,
        );
        assert_eq!(
            decide(&request("ff01")?, &claim),
            IdempotencyDecision::Reject(RejectReason::InFlight)
        );
        Ok(())
    }

    #[test]
    fn test_existing_in_progress_drops_stray_data() {
        let claim = IdempotencyClaim::existing(
            IdempotencyStatus::InProgress,
            RequestFingerprint::new("ff01"),
            Some(data()),
        );
        assert!(claim.data.is_none());
    }

    #[test]
    fn test_cached_data_only_on_replay() {
        assert!(IdempotencyDecision::Execute.cached_data().is_none());
        assert!(
            IdempotencyDecision::Reject(RejectReason::InFlight)
                .cached_data()
                .is_none()
        );
    }
}
