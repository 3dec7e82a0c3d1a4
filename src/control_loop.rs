//! Control Loop: orchestrates the Lease Manager, Policy Object Controller,
//! Credential Reconciler, and Producer Liaison through one cooperative
//! iteration (spec §4.6). `Coordinator` owns every subcomponent (spec §9
//! "Global-mutable state → injected services"), modeled structurally on
//! the original `forgemanager.py`'s `main()` loop body and the teacher's
//! `main.rs` `tokio::select!` shutdown race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialOperation, CredentialReconciler};
use crate::lease::LeaseManager;
use crate::liaison::{ProducerLiaison, ReloadOutcome};
use crate::policy::PolicyController;
use crate::server::metrics::SharedMetrics;

const MAX_SLEEP_BACKOFF: Duration = Duration::from_secs(30);

/// Metric-label suffix for a reload-signal attempt (spec §6's richer
/// reason labels, SPEC_FULL.md "Supplemented features"). Pure so it can
/// be tested without a `ProducerLiaison` instance.
fn reload_signal_label(reason: &str, outcome: ReloadOutcome) -> String {
    match outcome {
        ReloadOutcome::Delivered => reason.to_string(),
        ReloadOutcome::SkippedCrossContainer => format!("{reason}_cross_container"),
        ReloadOutcome::PermissionDenied => format!("{reason}_skipped"),
    }
}

fn credential_op_label(op: CredentialOperation) -> &'static str {
    match op {
        CredentialOperation::Copy => "copy",
        CredentialOperation::Remove => "remove",
    }
}

/// Reconcile credentials to `desired_present` and, if anything changed,
/// notify the producer exactly once with the given `reason` (spec §4.6
/// steps 7-8; P3 "every return `changed = true` from `Reconcile` ... is
/// followed, in the same iteration, by exactly one `NotifyReload`"). A free
/// function over the three I/O-free collaborators (`CredentialReconciler`,
/// `ProducerLiaison`, metrics) rather than a `Coordinator` method, so it is
/// unit-testable without a `kube::Client` (neither collaborator talks to
/// the object store).
fn reconcile_and_notify(
    credentials: &CredentialReconciler,
    liaison: &ProducerLiaison,
    metrics: &SharedMetrics,
    desired_present: bool,
    reason: &str,
) -> bool {
    let (changed, ops) = credentials.reconcile(desired_present);
    for (op, file) in &ops {
        metrics.record_credential_operation(credential_op_label(*op), file);
    }
    if changed {
        let outcome = liaison.notify_reload(reason);
        metrics.record_reload_signal(&reload_signal_label(reason, outcome));
    }
    changed
}

/// Pure decision for spec §4.6 step 3's startup cleanup: purge credentials
/// left behind by a prior leader iff the lease currently names someone
/// other than this replica. A vacant lease (no prior holder observed yet)
/// or a lease this replica already holds leaves credentials untouched.
fn should_purge_orphaned_credentials(observed_holder: &str, replica_identity: &str) -> bool {
    !observed_holder.is_empty() && observed_holder != replica_identity
}

pub struct Coordinator {
    lease: LeaseManager,
    credentials: Arc<CredentialReconciler>,
    liaison: ProducerLiaison,
    policy: Arc<PolicyController>,
    metrics: SharedMetrics,
    replica_identity: String,
    sleep_interval: Duration,
    cluster_label: String,
    region: String,
    network: String,
    pool: String,
    startup_cleanup_done: AtomicBool,
    last_held: AtomicBool,
}

/// What happened during one iteration — surfaced for tests and logging,
/// not consulted by the caller for control flow (the loop is otherwise
/// self-contained per iteration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Startup,
    Running { held: bool, forging_allowed: bool },
}

#[allow(clippy::too_many_arguments)]
impl Coordinator {
    pub fn new(
        lease: LeaseManager,
        credentials: Arc<CredentialReconciler>,
        liaison: ProducerLiaison,
        policy: Arc<PolicyController>,
        metrics: SharedMetrics,
        replica_identity: String,
        sleep_interval: Duration,
        cluster_label: String,
        region: String,
        network: String,
        pool: String,
    ) -> Self {
        Self {
            lease,
            credentials,
            liaison,
            policy,
            metrics,
            replica_identity,
            sleep_interval,
            cluster_label,
            region,
            network,
            pool,
            startup_cleanup_done: AtomicBool::new(false),
            last_held: AtomicBool::new(false),
        }
    }

    /// One iteration of spec §4.6's steps 1-11.
    pub async fn run_iteration(&self) -> IterationOutcome {
        let (just_entered_startup, in_startup) = self.liaison.poll_phase();

        if just_entered_startup {
            // Running -> InStartup side effect (spec §4.3): the producer
            // restarting invalidates any prior forging state.
            self.lease.forfeit().await;
            reconcile_and_notify(
                &self.credentials,
                &self.liaison,
                &self.metrics,
                false,
                "startup_cleanup",
            );
        }

        if in_startup {
            self.credentials.provision_startup();
            self.sleep_jittered().await;
            return IterationOutcome::Startup;
        }

        if !self.startup_cleanup_done.swap(true, Ordering::SeqCst) {
            self.startup_cleanup().await;
        }

        let held = self.try_acquire_preserving_belief().await;
        let (forging_allowed, reason) = self.policy.should_allow_forging();
        let desired_present = held && forging_allowed;

        let notify_reason = if desired_present {
            "enable_forging"
        } else {
            "disable_forging"
        };
        reconcile_and_notify(
            &self.credentials,
            &self.liaison,
            &self.metrics,
            desired_present,
            notify_reason,
        );

        self.update_leader_status(held).await;
        self.emit_metrics(held, desired_present, reason);
        self.sleep_jittered().await;

        IterationOutcome::Running {
            held,
            forging_allowed,
        }
    }

    /// The first post-startup iteration's cleanup (spec §4.6 step 3):
    /// purge orphaned credentials left by a prior leader before this
    /// replica enters the regular lease/policy cycle.
    async fn startup_cleanup(&self) {
        let observed = self.lease.observe().await;
        if !should_purge_orphaned_credentials(&observed.holder, &self.replica_identity) {
            return;
        }
        reconcile_and_notify(
            &self.credentials,
            &self.liaison,
            &self.metrics,
            false,
            "startup_cleanup",
        );
    }

    /// Transient object-store errors during `try_acquire` must not flip
    /// this replica's belief about its own leadership (spec §4.1 "Failure
    /// semantics"); fall back to the last cached observation.
    async fn try_acquire_preserving_belief(&self) -> bool {
        match self.lease.try_acquire().await {
            Ok(held) => held,
            Err(e) => {
                warn!(error = %e, "lease acquisition failed, preserving last known belief");
                let cached = self.lease.observe().await;
                self.lease.is_local_leader(&cached)
            }
        }
    }

    /// Step 9: always patch when held; when not held, only clear the
    /// published claim if it still names this replica (P4, scenario 7).
    async fn update_leader_status(&self, held: bool) {
        let result = if held {
            self.policy.publish_leader_status(&self.replica_identity).await
        } else {
            self.policy
                .clear_leader_status_if_self(&self.replica_identity)
                .await
        };
        if let Err(e) = result {
            warn!(error = %e, held, "failed to update policy status");
        }
    }

    fn record_credential_ops(&self, ops: &[(CredentialOperation, &'static str)]) {
        for (op, file) in ops {
            self.metrics.record_credential_operation(credential_op_label(*op), file);
        }
    }

    fn emit_metrics(&self, held: bool, desired_present: bool, reason: &str) {
        self.metrics.set_leader_status(held);
        self.metrics.set_forging_enabled(desired_present);
        if self.last_held.swap(held, Ordering::SeqCst) != held {
            self.metrics.record_leadership_change();
        }
        debug!(held, desired_present, reason, "iteration metrics emitted");
    }

    /// `baseInterval + uniform(-0.2, +0.2) * baseInterval`, floor 1s (spec
    /// §4.6 step 11).
    async fn sleep_jittered(&self) {
        let jitter = rand::thread_rng().gen_range(-0.2..0.2);
        let secs = (self.sleep_interval.as_secs_f64() * (1.0 + jitter)).max(1.0);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Publishes the cluster-scoped forging gauges (`cluster_forge_enabled`/
    /// `cluster_forge_priority`) independently of the per-iteration
    /// control flow, since they reflect the policy snapshot rather than
    /// this replica's own lease state.
    fn publish_cluster_gauges(&self, enabled: bool, priority: i32) {
        self.metrics.set_cluster_forge_state(
            &self.cluster_label,
            &self.region,
            &self.network,
            &self.pool,
            enabled,
            priority,
        );
    }

    /// Drain credentials to absent on shutdown (spec §4.6 "Shutdown").
    pub async fn shutdown_reconcile(&self) {
        let (changed, ops) = self.credentials.reconcile(false);
        self.record_credential_ops(&ops);
        if changed {
            info!("retracted credentials on shutdown");
        }
    }

    /// Runs iterations until `shutdown` is tripped. Every iteration runs as
    /// its own spawned task so a panic inside it surfaces as a `JoinError`
    /// rather than taking down the control loop: on an unhandled error the
    /// loop logs, doubles the next sleep (bounded to 30s), and continues
    /// (spec §7 "Propagation policy"). In normal operation no iteration
    /// panics — every fallible path already returns and handles a
    /// `Result` inline — this is the last line of defense.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut backoff = self.sleep_interval;
        while !shutdown.is_cancelled() {
            let this = Arc::clone(&self);
            let task = tokio::spawn(async move { this.run_iteration().await });

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = task => res,
            };

            match outcome {
                Ok(IterationOutcome::Running { .. }) => {
                    backoff = self.sleep_interval;
                    let (enabled, priority) = self.policy.effective_snapshot();
                    self.publish_cluster_gauges(enabled, priority);
                }
                Ok(IterationOutcome::Startup) => {
                    backoff = self.sleep_interval;
                }
                Err(join_err) => {
                    error!(error = %join_err, "control loop iteration panicked, backing off");
                    backoff = (backoff * 2).min(MAX_SLEEP_BACKOFF);
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        self.shutdown_reconcile().await;
    }
}

#[cfg(test)]
#[path = "control_loop_test.rs"]
mod tests;
