//! Health Prober: periodic HTTP GET against the configured endpoint,
//! consecutive-failure counter, status patch.
//!
//! Grounded in `cluster_manager.py`'s `_health_check_loop`/
//! `_perform_health_check`, using `reqwest` (already a teacher dependency,
//! repurposed here from CDEvents emission to a health-check GET).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::policy::{HealthState, PolicyController};

/// Outcome of a single probe attempt — `Ok(())` iff the transport
/// succeeded AND the response status was exactly 200 (spec §4.5).
pub type ProbeResult = Result<(), String>;

/// The transport-level check, factored out as a pure-ish async function so
/// it can be exercised against a local HTTP server without a `kube::Client`
/// in scope.
pub async fn probe_endpoint(client: &reqwest::Client, endpoint: &str, timeout: Duration) -> ProbeResult {
    match client.get(endpoint).timeout(timeout).send().await {
        Ok(resp) if resp.status().as_u16() == 200 => Ok(()),
        Ok(resp) => Err(format!("unexpected status {}", resp.status())),
        Err(e) => Err(e.to_string()),
    }
}

pub struct HealthProber {
    client: reqwest::Client,
    endpoint: String,
    interval: Duration,
    timeout: Duration,
    health: Arc<HealthState>,
    policy: Arc<PolicyController>,
}

impl HealthProber {
    pub fn new(
        endpoint: String,
        interval: Duration,
        timeout: Duration,
        health: Arc<HealthState>,
        policy: Arc<PolicyController>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            interval,
            timeout,
            health,
            policy,
        }
    }

    async fn probe_once(&self) {
        match probe_endpoint(&self.client, &self.endpoint, self.timeout).await {
            Ok(()) => {
                self.health.record_success();
                self.health.touch(None).await;
                debug!(endpoint = %self.endpoint, "health probe succeeded");
            }
            Err(message) => {
                let count = self.health.record_failure();
                self.health.touch(Some(message.clone())).await;
                warn!(endpoint = %self.endpoint, consecutive_failures = count, %message, "health probe failed");
            }
        }

        if let Err(e) = self.policy.patch_health_status().await {
            warn!(error = %e, "failed to patch health status");
        }
    }

    /// Spawn the probe loop. The sleep between probes is interruptible on
    /// `shutdown` (spec §4.5, §5).
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {
                        self.probe_once().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "health_prober_test.rs"]
mod tests;
