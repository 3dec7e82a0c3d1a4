//! Assertion helpers for lease-takeover and policy-reconciliation scenarios.

use k8s_openapi::api::coordination::v1::Lease;
use kube::api::Api;
use std::error::Error;

use forge_coordinator::crd::policy::ForgePolicy;

/// Assert the named lease is currently held by `expected_holder`.
pub async fn assert_lease_holder(
    client: &kube::Client,
    namespace: &str,
    lease_name: &str,
    expected_holder: &str,
) -> Result<(), Box<dyn Error>> {
    let leases: Api<Lease> = Api::namespaced(client.clone(), namespace);
    let lease = leases.get(lease_name).await?;

    let actual = lease
        .spec
        .as_ref()
        .and_then(|s| s.holder_identity.as_deref())
        .unwrap_or("");

    if actual != expected_holder {
        return Err(format!(
            "lease {}: expected holder {}, got {}",
            lease_name, expected_holder, actual
        )
        .into());
    }

    println!("lease {} held by {}", lease_name, actual);
    Ok(())
}

/// Assert the policy object's published `activeLeader` matches.
pub async fn assert_policy_active_leader(
    client: &kube::Client,
    policy_name: &str,
    expected_leader: &str,
) -> Result<(), Box<dyn Error>> {
    let policies: Api<ForgePolicy> = Api::all(client.clone());
    let policy = policies.get(policy_name).await?;

    let actual = policy
        .status
        .as_ref()
        .map(|s| s.active_leader.as_str())
        .unwrap_or("");

    if actual != expected_leader {
        return Err(format!(
            "policy {}: expected activeLeader {}, got {}",
            policy_name, expected_leader, actual
        )
        .into());
    }

    println!("policy {} activeLeader is {}", policy_name, actual);
    Ok(())
}

/// Assert the policy object's `forgingEnabled` status field matches.
pub async fn assert_policy_forging_enabled(
    client: &kube::Client,
    policy_name: &str,
    expected: bool,
) -> Result<(), Box<dyn Error>> {
    let policies: Api<ForgePolicy> = Api::all(client.clone());
    let policy = policies.get(policy_name).await?;

    let actual = policy
        .status
        .as_ref()
        .map(|s| s.forging_enabled)
        .unwrap_or(false);

    if actual != expected {
        return Err(format!(
            "policy {}: expected forgingEnabled={}, got {}",
            policy_name, expected, actual
        )
        .into());
    }

    println!("policy {} forgingEnabled is {}", policy_name, actual);
    Ok(())
}
