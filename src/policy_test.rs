//! `PolicyController` itself talks to the object store (`kube::Client`)
//! from its very constructor, so its ensure/watch/patch behavior is
//! exercised by the live-cluster integration suite under
//! `tests/integration/`, not here. This file unit-tests the pieces that
//! don't require a cluster: the shared health counter, and the pure
//! race-safe-clearing predicate behind `clear_leader_status_if_self`.

use super::{should_clear_active_leader, HealthState};

#[tokio::test]
async fn health_state_starts_clean() {
    let state = HealthState::default();
    assert_eq!(state.consecutive_failures(), 0);
    assert!(state.last_probe_time().await.is_none());
}

#[tokio::test]
async fn record_failure_increments_and_record_success_resets() {
    let state = HealthState::default();
    assert_eq!(state.record_failure(), 1);
    assert_eq!(state.record_failure(), 2);
    assert_eq!(state.consecutive_failures(), 2);

    state.record_success();
    assert_eq!(state.consecutive_failures(), 0);
}

#[tokio::test]
async fn touch_records_probe_time_and_message() {
    let state = HealthState::default();
    state.touch(Some("probe failed: timeout".to_string())).await;

    assert!(state.last_probe_time().await.is_some());
    assert_eq!(
        state.last_message().await,
        Some("probe failed: timeout".to_string())
    );
}

/// P4: clearing a claim is only permitted when the published claim still
/// names the replica attempting the clear.
#[test]
fn update_leader_status_never_overwrites_other_claim() {
    assert!(!should_clear_active_leader(
        Some("replica-a"),
        "replica-b"
    ));
}

/// Scenario 7: a replica that lost the lease while another replica's claim
/// is already published must not clear that claim.
#[test]
fn does_not_clear_status_claimed_by_other_replica() {
    assert!(!should_clear_active_leader(Some("replica-a"), "replica-b"));
    assert!(should_clear_active_leader(Some("replica-b"), "replica-b"));
}

#[test]
fn no_claim_published_is_not_this_replicas_to_clear() {
    assert!(!should_clear_active_leader(None, "replica-b"));
}
