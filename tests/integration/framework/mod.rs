//! Integration test framework for the forge-leadership coordinator.
//!
//! Provides infrastructure for exercising lease-takeover and
//! policy-reconciliation behavior against a real Kubernetes (kind) cluster:
//! cluster lifecycle, namespace/lease/policy helpers, and metrics scraping.

#![allow(dead_code)] // Test framework - fields/functions used across different scenarios

pub mod assertions;
pub mod cluster;
pub mod k8s;
pub mod metrics;

use serde::Deserialize;
use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Test configuration loaded from config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    pub cluster: ClusterConfig,
    pub scenarios: ScenarioConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub reuse: bool,
    pub cleanup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub lease_takeover: bool,
    pub policy_reconciliation: bool,
    pub startup_phase_gating: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    pub lease_ready_secs: u64,
    pub policy_ready_secs: u64,
    pub reconciliation_secs: u64,
}

impl TestConfig {
    /// Load configuration from tests/integration/config.toml
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let config_path = "tests/integration/config.toml";
        let contents = std::fs::read_to_string(config_path)?;
        let config: TestConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Test context holds shared state across scenarios.
pub struct TestContext {
    pub client: kube::Client,
    pub namespace: String,
    pub metrics: metrics::MetricsCollector,
    pub config: TestConfig,

    /// Name of the coordination.k8s.io Lease this run exercises.
    pub lease_name: String,
    /// Name of the cluster-scoped ForgePolicy object this run exercises.
    pub policy_name: String,
}

impl TestContext {
    /// Create new test context
    pub async fn new(config: &TestConfig) -> Result<Self, Box<dyn Error>> {
        cluster::ensure_cluster(&config.cluster).await?;

        let client = kube::Client::try_default().await?;

        let namespace = format!("forge-coordinator-test-{}", chrono::Utc::now().timestamp());
        k8s::create_namespace(&client, &namespace).await?;

        let metrics = metrics::MetricsCollector::new();

        Ok(Self {
            client,
            namespace,
            metrics,
            config: config.clone(),
            lease_name: "forge-leader-preprod-test00000".to_string(),
            policy_name: "preprod-test00000-eu-west-1".to_string(),
        })
    }

    /// Cleanup test resources
    pub async fn cleanup(&self, config: &TestConfig) -> Result<(), Box<dyn Error>> {
        k8s::delete_namespace(&self.client, &self.namespace).await?;

        if config.cluster.cleanup {
            cluster::delete_cluster(&config.cluster).await?;
        }

        Ok(())
    }
}

/// Trait for test scenarios
#[async_trait::async_trait]
pub trait TestScenario: Send + Sync {
    /// Name of the scenario
    fn name(&self) -> &str;

    /// Run the scenario
    async fn run(&self, ctx: &mut TestContext) -> TestResult;

    /// Check if scenario should be skipped
    fn should_skip(&self, config: &TestConfig) -> bool;
}
