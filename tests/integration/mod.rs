//! Live-cluster integration harness for the forge-leadership coordinator.
//! Gated behind `FORGE_COORDINATOR_RUN_LIVE_TESTS` and `#[ignore]` (see
//! `tests/integration_test.rs`) since it requires a real (kind) cluster.

pub mod framework;
pub mod scenarios;

pub use framework::{TestConfig, TestContext, TestResult, TestScenario};
