//! Prometheus metrics for the forge coordinator.
//!
//! Exposes the exact metric names spec §6 lists, plus the static info
//! metric (supplemented feature #1, see DESIGN.md), modeled on the
//! teacher's `ControllerMetrics` shape but rebuilt around this
//! coordinator's own observability surface.

use prometheus::{
    self, Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// The label values every per-replica scalar metric is bound to at
/// construction time (spec §6: "all gauges/counters labeled with
/// `{replica, network, pool, application}` where appropriate"). A single
/// coordinator process only ever reports for itself, so these are bound
/// once rather than carried as a vec dimension on every `.set()` call.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    pub replica: String,
    pub namespace: String,
    pub network: String,
    pub pool: String,
    pub application: String,
}

/// Coordinator metrics registry. Clone is cheap (`Arc` internally via
/// [`SharedMetrics`]).
pub struct ControllerMetrics {
    registry: Registry,

    pub forging_enabled: IntGauge,
    pub leader_status: IntGauge,
    pub leadership_changes_total: IntCounter,
    reload_signals_total: IntCounterVec,
    credential_operations_total: IntCounterVec,
    cluster_forge_enabled: IntGaugeVec,
    cluster_forge_priority: IntGaugeVec,
}

impl ControllerMetrics {
    pub fn new(labels: &MetricLabels) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let base_labels = ["replica", "network", "pool", "application"];
        let base_values = [
            labels.replica.as_str(),
            labels.network.as_str(),
            labels.pool.as_str(),
            labels.application.as_str(),
        ];

        let forging_enabled_vec = IntGaugeVec::new(
            Opts::new(
                "forging_enabled",
                "1 if this replica currently holds forging credentials",
            ),
            &base_labels,
        )?;
        registry.register(Box::new(forging_enabled_vec.clone()))?;
        let forging_enabled = forging_enabled_vec.with_label_values(&base_values);

        let leader_status_vec = IntGaugeVec::new(
            Opts::new(
                "leader_status",
                "1 if this replica currently holds the local lease",
            ),
            &base_labels,
        )?;
        registry.register(Box::new(leader_status_vec.clone()))?;
        let leader_status = leader_status_vec.with_label_values(&base_values);

        let leadership_changes_vec = IntCounterVec::new(
            Opts::new(
                "leadership_changes_total",
                "Total number of times this replica's lease-holder status flipped",
            ),
            &base_labels,
        )?;
        registry.register(Box::new(leadership_changes_vec.clone()))?;
        let leadership_changes_total = leadership_changes_vec.with_label_values(&base_values);

        let reload_signals_total = IntCounterVec::new(
            Opts::new(
                "reload_signals_total",
                "Total number of producer reload signals attempted, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(reload_signals_total.clone()))?;

        let credential_operations_total = IntCounterVec::new(
            Opts::new(
                "credential_operations_total",
                "Total number of credential file operations, by operation and file",
            ),
            &["operation", "file"],
        )?;
        registry.register(Box::new(credential_operations_total.clone()))?;

        let cluster_forge_enabled = IntGaugeVec::new(
            Opts::new(
                "cluster_forge_enabled",
                "1 if the policy object's effective state currently permits forging",
            ),
            &["cluster", "region", "network", "pool"],
        )?;
        registry.register(Box::new(cluster_forge_enabled.clone()))?;

        let cluster_forge_priority = IntGaugeVec::new(
            Opts::new(
                "cluster_forge_priority",
                "The policy object's effective priority, published for cross-cluster arbitration",
            ),
            &["cluster", "region", "network", "pool"],
        )?;
        registry.register(Box::new(cluster_forge_priority.clone()))?;

        let info = IntGaugeVec::new(
            Opts::new("forge_coordinator_info", "Static build/identity info"),
            &["replica", "namespace", "version"],
        )?;
        registry.register(Box::new(info.clone()))?;
        info.with_label_values(&[
            &labels.replica,
            &labels.namespace,
            env!("CARGO_PKG_VERSION"),
        ])
        .set(1);

        Ok(Self {
            registry,
            forging_enabled,
            leader_status,
            leadership_changes_total,
            reload_signals_total,
            credential_operations_total,
            cluster_forge_enabled,
            cluster_forge_priority,
        })
    }

    pub fn set_forging_enabled(&self, enabled: bool) {
        self.forging_enabled.set(enabled as i64);
    }

    pub fn set_leader_status(&self, held: bool) {
        self.leader_status.set(held as i64);
    }

    pub fn record_leadership_change(&self) {
        self.leadership_changes_total.inc();
    }

    /// `reason` matches the original's richer label values
    /// (`enable_forging`, `disable_forging`, `startup_cleanup`, and a
    /// `_skipped`/`_cross_container` suffix for the non-addressable
    /// delivery outcome) — see DESIGN.md supplemented feature #2.
    pub fn record_reload_signal(&self, reason: &str) {
        self.reload_signals_total.with_label_values(&[reason]).inc();
    }

    pub fn record_credential_operation(&self, operation: &str, file: &str) {
        self.credential_operations_total
            .with_label_values(&[operation, file])
            .inc();
    }

    pub fn set_cluster_forge_state(
        &self,
        cluster: &str,
        region: &str,
        network: &str,
        pool: &str,
        enabled: bool,
        priority: i32,
    ) {
        self.cluster_forge_enabled
            .with_label_values(&[cluster, region, network, pool])
            .set(enabled as i64);
        self.cluster_forge_priority
            .with_label_values(&[cluster, region, network, pool])
            .set(priority as i64);
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle for use across the coordinator's tasks.
pub type SharedMetrics = Arc<ControllerMetrics>;

pub fn create_metrics(labels: &MetricLabels) -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new(labels)?))
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
