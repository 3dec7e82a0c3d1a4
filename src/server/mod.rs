//! HTTP server for health and metrics endpoints.
//!
//! Exposes the observability surface spec §6 names:
//! - `/health` - process liveness
//! - `/startup-status` - credential-provisioning readiness
//! - `/metrics` - Prometheus metrics endpoint
//!
//! Also provides graceful shutdown signaling for SIGTERM/SIGINT.

mod health;
pub mod metrics;
pub mod shutdown;

pub use health::{run_health_server, ServerState};
pub use metrics::{create_metrics, ControllerMetrics, MetricLabels, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};
