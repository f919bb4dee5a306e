//! Property-based tests for the decision maker using proptest.
//!
//! Properties verified:
//! - The decision maker is total and deterministic
//! - A fingerprint mismatch always rejects, whatever the status or ownership
//! - Cached data exists iff the decision is a replay
//! - Execute only for the owner of an in-progress record

use idem_core::{
    DecisionKind, IdempotencyClaim, IdempotencyData, IdempotencyDecision, IdempotencyKey,
    IdempotencyRequest, IdempotencyStatus, RejectReason, RequestFingerprint, decide,
};
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = IdempotencyStatus> {
    prop_oneof![
        Just(IdempotencyStatus::InProgress),
        Just(IdempotencyStatus::Completed),
    ]
}

fn data_strategy() -> impl Strategy<Value = Option<IdempotencyData>> {
    proptest::option::of(
        proptest::collection::btree_map("[a-z-]{1,12}", "[ -~]{0,24}", 0..4)
            .prop_map(IdempotencyData::from),
    )
}

fn claim_strategy() -> impl Strategy<Value = IdempotencyClaim> {
    (any::<bool>(), status_strategy(), "[a-f0-9]{1,4}", data_strategy()).prop_map(
        |(is_owner, status, fingerprint, data)| IdempotencyClaim {
            is_owner,
            status,
            stored_fingerprint: RequestFingerprint::new(fingerprint),
            data,
        },
    )
}

fn request(fingerprint: &str) -> Result<IdempotencyRequest, TestCaseError> {
    let key = IdempotencyKey::new("user", "orders", "key")
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    Ok(IdempotencyRequest::new(key, RequestFingerprint::new(fingerprint)))
}

proptest! {
    #[test]
    fn prop_decide_is_deterministic(claim in claim_strategy(), fp in "[a-f0-9]{1,4}") {
        let req = request(&fp)?;
        prop_assert_eq!(decide(&req, &claim), decide(&req, &claim));
    }

    #[test]
    fn prop_mismatch_always_rejects(claim in claim_strategy(), fp in "[a-f0-9]{1,4}") {
        prop_assume!(claim.stored_fingerprint.as_str() != fp);
        let req = request(&fp)?;
        prop_assert_eq!(
            decide(&req, &claim),
            IdempotencyDecision::Reject(RejectReason::FingerprintMismatch)
        );
    }

    #[test]
    fn prop_cached_data_iff_replay(claim in claim_strategy(), fp in "[a-f0-9]{1,4}") {
        let req = request(&fp)?;
        let decision = decide(&req, &claim);
        prop_assert_eq!(
            decision.cached_data().is_some(),
            decision.kind() == DecisionKind::Replay
        );
    }

    #[test]
    fn prop_matching_fingerprint_follows_priority(claim in claim_strategy()) {
        let req = request(claim.stored_fingerprint.as_str())?;
        let decision = decide(&req, &claim);

        let expected = match (claim.status, &claim.data, claim.is_owner) {
            (IdempotencyStatus::Completed, Some(data), _) => IdempotencyDecision::Replay(data.clone()),
            (IdempotencyStatus::Completed, None, _) => {
                IdempotencyDecision::Reject(RejectReason::InconsistentRecord)
            }
            (IdempotencyStatus::InProgress, _, false) => {
                IdempotencyDecision::Reject(RejectReason::InFlight)
            }
            (IdempotencyStatus::InProgress, _, true) => IdempotencyDecision::Execute,
        };
        prop_assert_eq!(decision, expected);
    }

    #[test]
    fn prop_execute_requires_owned_in_progress(claim in claim_strategy(), fp in "[a-f0-9]{1,4}") {
        let req = request(&fp)?;
        if decide(&req, &claim).is_execute() {
            prop_assert!(claim.is_owner);
            prop_assert_eq!(claim.status, IdempotencyStatus::InProgress);
        }
    }
}
