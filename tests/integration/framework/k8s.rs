//! Kubernetes resource helpers

use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;

use forge_coordinator::crd::policy::ForgePolicy;

/// Create a namespace
pub async fn create_namespace(client: &kube::Client, name: &str) -> Result<(), Box<dyn Error>> {
    let ns: Api<Namespace> = Api::all(client.clone());

    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    ns.create(&PostParams::default(), &namespace).await?;
    println!("created namespace: {}", name);

    Ok(())
}

/// Delete a namespace
pub async fn delete_namespace(client: &kube::Client, name: &str) -> Result<(), Box<dyn Error>> {
    let ns: Api<Namespace> = Api::all(client.clone());

    match ns.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("deleted namespace: {}", name);
            Ok(())
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            // Already deleted, that's fine
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Poll until the named lease's `holderIdentity` equals `expected_holder`.
pub async fn wait_for_lease_holder(
    client: &kube::Client,
    namespace: &str,
    name: &str,
    expected_holder: &str,
    timeout_secs: u64,
) -> Result<(), Box<dyn Error>> {
    let leases: Api<Lease> = Api::namespaced(client.clone(), namespace);
    let start = std::time::Instant::now();

    loop {
        if start.elapsed().as_secs() > timeout_secs {
            return Err(format!("timeout waiting for lease {} to be held by {}", name, expected_holder).into());
        }

        if let Ok(lease) = leases.get(name).await {
            let holder = lease
                .spec
                .as_ref()
                .and_then(|s| s.holder_identity.as_deref());
            if holder == Some(expected_holder) {
                return Ok(());
            }
        }

        sleep(Duration::from_secs(1)).await;
    }
}

/// Poll until the named policy object's `status.activeLeader` equals
/// `expected_leader`.
pub async fn wait_for_policy_active_leader(
    client: &kube::Client,
    name: &str,
    expected_leader: &str,
    timeout_secs: u64,
) -> Result<(), Box<dyn Error>> {
    let policies: Api<ForgePolicy> = Api::all(client.clone());
    let start = std::time::Instant::now();

    loop {
        if start.elapsed().as_secs() > timeout_secs {
            return Err(format!(
                "timeout waiting for policy {} activeLeader to be {}",
                name, expected_leader
            )
            .into());
        }

        if let Ok(policy) = policies.get(name).await {
            if let Some(status) = &policy.status {
                if status.active_leader == expected_leader {
                    return Ok(());
                }
            }
        }

        sleep(Duration::from_secs(1)).await;
    }
}
