//! Lease takeover: a lease held by a stale, expired holder must be taken
//! over by a fresh replica attempting to acquire it (spec §4.1, §8 scenario
//! 2).

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};

use forge_coordinator::lease::LeaseManager;

use crate::integration::framework::{assertions, TestContext, TestResult, TestScenario};

pub struct LeaseTakeoverScenario;

#[async_trait::async_trait]
impl TestScenario for LeaseTakeoverScenario {
    fn name(&self) -> &str {
        "lease_takeover"
    }

    fn should_skip(&self, config: &crate::integration::framework::TestConfig) -> bool {
        !config.scenarios.lease_takeover
    }

    async fn run(&self, ctx: &mut TestContext) -> TestResult {
        let leases: Api<Lease> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

        // Seed a lease already held by a stale replica with a renewal far
        // enough in the past to be expired against a short TTL.
        let stale_renew = k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(
            chrono::Utc::now() - chrono::Duration::seconds(120),
        );
        let seeded = Lease {
            metadata: ObjectMeta {
                name: Some(ctx.lease_name.clone()),
                namespace: Some(ctx.namespace.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some("stale-replica-0".to_string()),
                acquire_time: Some(stale_renew.clone()),
                renew_time: Some(stale_renew),
                lease_duration_seconds: Some(15),
                lease_transitions: Some(3),
                ..Default::default()
            }),
        };
        match leases.create(&PostParams::default(), &seeded).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": "stale-replica-0",
                        "leaseTransitions": 3,
                    }
                });
                leases
                    .patch(&ctx.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let manager = LeaseManager::new(
            ctx.client.clone(),
            ctx.namespace.clone(),
            ctx.lease_name.clone(),
            "fresh-replica-0".to_string(),
            Duration::from_secs(15),
        );

        let held = manager.try_acquire().await?;
        if !held {
            return Err("expected fresh replica to take over the expired lease".into());
        }

        assertions::assert_lease_holder(&ctx.client, &ctx.namespace, &ctx.lease_name, "fresh-replica-0")
            .await?;

        Ok(())
    }
}
