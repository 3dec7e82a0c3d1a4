//! Policy reconciliation: a `Disabled` policy object must gate forging off
//! regardless of lease state, and flipping it to `Enabled` must lift the
//! gate on the next reconciliation (spec §4.4, §8 scenario 3).

use kube::api::{Api, Patch, PatchParams, PostParams};

use forge_coordinator::crd::policy::{default_spec, ForgePolicy, ForgeState, PoolDescriptor};
use forge_coordinator::identity::TenancyKey;
use forge_coordinator::policy::PolicyController;

use crate::integration::framework::{assertions, TestContext, TestResult, TestScenario};

pub struct PolicyReconciliationScenario;

#[async_trait::async_trait]
impl TestScenario for PolicyReconciliationScenario {
    fn name(&self) -> &str {
        "policy_reconciliation"
    }

    fn should_skip(&self, config: &crate::integration::framework::TestConfig) -> bool {
        !config.scenarios.policy_reconciliation
    }

    async fn run(&self, ctx: &mut TestContext) -> TestResult {
        let policies: Api<ForgePolicy> = Api::all(ctx.client.clone());

        let tenancy = TenancyKey::new("preprod", "test00000", "eu-west-1");
        let pool = PoolDescriptor {
            id_hex: "deadbeef".to_string(),
            name: "Test Pool".to_string(),
            ticker: "TEST".to_string(),
        };
        let mut spec = default_spec(&tenancy, 0, 1, &pool);
        spec.forge_state = ForgeState::Disabled;
        let object = ForgePolicy::new(&ctx.policy_name, spec);

        match policies.create(&PostParams::default(), &object).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {
                let patch = serde_json::json!({ "spec": { "forgeState": "Disabled" } });
                policies
                    .patch(&ctx.policy_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let controller = PolicyController::new(ctx.client.clone(), tenancy, 0, true, 1, pool);
        let watch_token = tokio_util::sync::CancellationToken::new();
        let watch_handle = controller.start(watch_token.clone());

        // Give the watcher time to observe the seeded spec before asserting.
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        let (allowed, reason) = controller.should_allow_forging();
        if allowed {
            return Err(format!("expected forging disallowed while policy is Disabled, reason={reason}").into());
        }

        controller.publish_leader_status("test-leader-0").await?;
        assertions::assert_policy_active_leader(&ctx.client, &ctx.policy_name, "test-leader-0").await?;
        assertions::assert_policy_forging_enabled(&ctx.client, &ctx.policy_name, false).await?;

        let patch = serde_json::json!({ "spec": { "forgeState": "Enabled" } });
        policies
            .patch(&ctx.policy_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        let (allowed, _) = controller.should_allow_forging();
        if !allowed {
            return Err("expected forging allowed after policy flipped to Enabled".into());
        }

        watch_token.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), watch_handle).await;

        Ok(())
    }
}
