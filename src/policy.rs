//! Policy Object Controller: ensure the cluster-scoped policy object
//! exists, watch it with resumption, compute effective state, and patch
//! status (local leader only).
//!
//! Grounded in `cluster_manager.py`'s `ClusterForgeManager` for the
//! ensure/watch/status-patch algorithm, and the teacher's `main.rs`
//! `watcher::Config` usage for the kube-rs watch idiom — `kube::runtime::
//! watcher` + `WatchStreamExt::default_backoff()` handles stream
//! resumption and `Gone` restarts, replacing `_watch_cluster_crd`'s
//! hand-rolled `except ApiException` retry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crd::policy::{
    compute_effective_state, default_spec, should_allow_forging, ForgePolicy, ForgePolicySpec,
    PoolDescriptor,
};
use crate::error::ObjectStoreError;
use crate::identity::TenancyKey;

/// Consecutive-failure counter and last-probe time shared between the
/// Health Prober and the effective-state computation. Kept as a plain
/// struct behind small atomics/mutex per spec §5 ("critical sections are
/// short — assignments and reads of small fields only").
#[derive(Default)]
pub struct HealthState {
    consecutive_failures: AtomicU32,
    last_probe: Mutex<Option<chrono::DateTime<Utc>>>,
    last_message: Mutex<Option<String>>,
}

impl HealthState {
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn touch(&self, message: Option<String>) {
        *self.last_probe.lock().await = Some(Utc::now());
        *self.last_message.lock().await = message;
    }

    pub async fn last_probe_time(&self) -> Option<chrono::DateTime<Utc>> {
        *self.last_probe.lock().await
    }

    pub async fn last_message(&self) -> Option<String> {
        self.last_message.lock().await.clone()
    }
}

/// Pure decision behind `clear_leader_status_if_self` (P4, scenario 7):
/// only clear the published claim when it still names this replica. A
/// status with no claim at all (`None`) is not this replica's to clear.
fn should_clear_active_leader(published: Option<&str>, replica: &str) -> bool {
    published == Some(replica)
}

pub struct PolicyController {
    api: Api<ForgePolicy>,
    name: String,
    enabled: bool,
    tenancy: TenancyKey,
    default_priority: i32,
    network_magic: u32,
    pool: PoolDescriptor,
    snapshot_tx: watch::Sender<Option<ForgePolicySpec>>,
    snapshot_rx: watch::Receiver<Option<ForgePolicySpec>>,
    pub health: Arc<HealthState>,
}

impl PolicyController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: kube::Client,
        tenancy: TenancyKey,
        default_priority: i32,
        enabled: bool,
        network_magic: u32,
        pool: PoolDescriptor,
    ) -> Self {
        let name = tenancy.policy_object_name();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        Self {
            api: Api::all(client),
            name,
            enabled,
            tenancy,
            default_priority,
            network_magic,
            pool,
            snapshot_tx,
            snapshot_rx,
            health: Arc::new(HealthState::default()),
        }
    }

    /// Create the policy object with a default spec if it is absent.
    /// Mirrors `_create_cluster_crd`'s default spec shape, populated from
    /// this replica's configuration (spec §3: the spec is never modified
    /// by the coordinator afterward, so it must be right from creation).
    pub async fn ensure_exists(&self) -> Result<(), ObjectStoreError> {
        if !self.enabled {
            return Ok(());
        }
        match self.api.get(&self.name).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                let spec = default_spec(
                    &self.tenancy,
                    self.default_priority,
                    self.network_magic,
                    &self.pool,
                );
                let object = ForgePolicy::new(&self.name, spec);
                match self.api.create(&PostParams::default(), &object).await {
                    Ok(_) => {
                        info!(name = %self.name, "created policy object with default spec");
                        Ok(())
                    }
                    Err(kube::Error::Api(e2)) if e2.code == 409 => Ok(()),
                    Err(e2) => Err(e2.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Spawn the watch task. The health prober is spawned separately by
    /// the control loop, which owns the HTTP client it probes with.
    pub fn start(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let api = self.api.clone();
        let name = self.name.clone();
        let tx = self.snapshot_tx.clone();
        let enabled = self.enabled;
        tokio::spawn(async move {
            if !enabled {
                return;
            }
            run_watch(api, name, tx, shutdown).await;
        })
    }

    /// `(bool, reason)` — the gate consulted by the control loop.
    pub fn should_allow_forging(&self) -> (bool, &'static str) {
        if !self.enabled {
            return (true, "disabled");
        }
        let snapshot = self.snapshot_rx.borrow();
        match snapshot.as_ref() {
            None => (true, "permissive_default"),
            Some(spec) => {
                let effective = compute_effective_state(
                    spec,
                    self.health.consecutive_failures(),
                    Utc::now(),
                );
                (should_allow_forging(&effective), effective.reason)
            }
        }
    }

    /// `(bool, priority)` for the cluster-scoped gauges, which publish
    /// independently of whether this replica holds the lease.
    pub fn effective_snapshot(&self) -> (bool, i32) {
        if !self.enabled {
            return (true, self.default_priority);
        }
        let snapshot = self.snapshot_rx.borrow();
        match snapshot.as_ref() {
            None => (true, self.default_priority),
            Some(spec) => {
                let effective = compute_effective_state(
                    spec,
                    self.health.consecutive_failures(),
                    Utc::now(),
                );
                (should_allow_forging(&effective), effective.priority)
            }
        }
    }

    /// Always patch status when this replica holds the lease (spec §4.6
    /// step 9's unconditional branch).
    pub async fn publish_leader_status(&self, replica: &str) -> Result<(), ObjectStoreError> {
        if !self.enabled {
            return Ok(());
        }
        let snapshot = self.snapshot_rx.borrow().clone();
        let now = Utc::now();
        let consecutive_failures = self.health.consecutive_failures();

        let effective = snapshot
            .as_ref()
            .map(|s| compute_effective_state(s, consecutive_failures, now));

        let (effective_state, effective_priority, reason) = match &effective {
            Some(e) => (Some(e.state), e.priority, e.reason),
            None => (None, 0, "permissive_default"),
        };
        let forging_enabled = effective.as_ref().map(should_allow_forging).unwrap_or(true);

        let body = serde_json::json!({
            "status": {
                "effectiveState": effective_state,
                "effectivePriority": effective_priority,
                "activeLeader": replica,
                "forgingEnabled": forging_enabled,
                "lastTransition": now,
                "reason": reason,
                "healthStatus": {
                    "healthy": consecutive_failures == 0,
                    "lastProbeTime": self.health.last_probe_time().await,
                    "consecutiveFailures": consecutive_failures,
                    "message": self.health.last_message().await,
                },
                "conditions": [{
                    "type": "Ready",
                    "status": "True",
                    "lastTransitionTime": now,
                    "reason": reason,
                    "message": serde_json::Value::Null,
                }],
            }
        });

        self.patch_status_body(body).await
    }

    /// Only patch (to clear `activeLeader`) if the published `activeLeader`
    /// still names this replica — never overwrite another replica's claim
    /// (P4, scenario 7).
    pub async fn clear_leader_status_if_self(&self, replica: &str) -> Result<(), ObjectStoreError> {
        if !self.enabled {
            return Ok(());
        }
        let current = self.api.get(&self.name).await?;
        let published = current.status.as_ref().map(|s| s.active_leader.as_str());
        if !should_clear_active_leader(published, replica) {
            return Ok(());
        }

        let body = serde_json::json!({
            "status": {
                "activeLeader": "",
                "forgingEnabled": false,
                "lastTransition": Utc::now(),
                "reason": "lease_lost",
            }
        });
        self.patch_status_body(body).await
    }

    /// Patch only the `healthStatus` sub-field (spec §4.5). Disjoint from
    /// the leader-claim fields `publish_leader_status`/
    /// `clear_leader_status_if_self` touch, so interleaving with those is
    /// safe at field granularity (spec §5).
    pub async fn patch_health_status(&self) -> Result<(), ObjectStoreError> {
        if !self.enabled {
            return Ok(());
        }
        let consecutive_failures = self.health.consecutive_failures();
        let body = serde_json::json!({
            "status": {
                "healthStatus": {
                    "healthy": consecutive_failures == 0,
                    "lastProbeTime": self.health.last_probe_time().await,
                    "consecutiveFailures": consecutive_failures,
                    "message": self.health.last_message().await,
                }
            }
        });
        self.patch_status_body(body).await
    }

    async fn patch_status_body(&self, body: serde_json::Value) -> Result<(), ObjectStoreError> {
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map(|_| ())
            .map_err(Into::into)
    }
}

/// Raw `Event` handling rather than `.applied_objects()`, so a deletion of
/// the policy object reverts the cached spec to `None` (the permissive
/// default, spec §4.4) instead of leaving the last-observed spec stale in
/// the snapshot channel.
async fn run_watch(
    api: Api<ForgePolicy>,
    name: String,
    tx: watch::Sender<Option<ForgePolicySpec>>,
    shutdown: CancellationToken,
) {
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("policy watch shutting down");
                break;
            }
            next = stream.next() => {
                match next {
                    Some(Ok(Event::Applied(policy))) => {
                        if policy.metadata.name.as_deref() == Some(name.as_str()) {
                            let _ = tx.send(Some(policy.spec));
                        }
                    }
                    Some(Ok(Event::Deleted(policy))) => {
                        if policy.metadata.name.as_deref() == Some(name.as_str()) {
                            info!(name = %name, "policy object deleted, reverting to permissive default");
                            let _ = tx.send(None);
                        }
                    }
                    Some(Ok(Event::Restarted(policies))) => {
                        // A relist: if our object survived it, the next Applied
                        // will refresh the snapshot; if it didn't, there is no
                        // per-object Deleted event to catch it, so clear here.
                        let still_present = policies
                            .iter()
                            .any(|p| p.metadata.name.as_deref() == Some(name.as_str()));
                        if !still_present {
                            let _ = tx.send(None);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "policy watch stream error, backoff will restart it");
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
