use std::sync::Arc;
use std::time::Duration;

use forge_coordinator::config::Config;
use forge_coordinator::control_loop::Coordinator;
use forge_coordinator::crd::PoolDescriptor;
use forge_coordinator::credentials::CredentialReconciler;
use forge_coordinator::health_prober::HealthProber;
use forge_coordinator::lease::LeaseManager;
use forge_coordinator::liaison::ProducerLiaison;
use forge_coordinator::policy::PolicyController;
use forge_coordinator::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, MetricLabels,
};
use tracing::{error, info, warn};

/// Bounded wait for background tasks to drain on shutdown, mirroring the
/// teacher's abort-on-timeout pattern rather than waiting indefinitely.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Tracing isn't initialized yet for a config error raised before
            // we know the configured log level, so this is the one place
            // that goes straight to stderr.
            eprintln!("startup-fatal configuration error: {e}");
            return Err(e.into());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(
        network = %config.tenancy.network,
        pool = %config.tenancy.pool_id,
        region = %config.tenancy.region,
        "starting forge-leadership coordinator"
    );

    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    let client = match kube::Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("connected to Kubernetes API");

    let replica_identity = config.replica_identity();
    let holder_identity = replica_identity.to_string();

    let lease = LeaseManager::new(
        client.clone(),
        config.namespace.clone(),
        config.lease_name(),
        holder_identity.clone(),
        config.lease_duration,
    );

    let credentials = Arc::new(CredentialReconciler::new(config.credentials.clone()));

    let liaison = ProducerLiaison::with_socket_check(
        config.socket_path.clone(),
        config.producer_process_name.clone(),
        config.disable_socket_check,
        config.socket_wait_timeout,
    );

    let policy = Arc::new(PolicyController::new(
        client.clone(),
        config.tenancy.clone(),
        config.priority,
        config.enable_cluster_management,
        config.network_magic,
        PoolDescriptor {
            id_hex: config.pool_id_hex.clone(),
            name: config.pool_name.clone(),
            ticker: config.pool_ticker.clone(),
        },
    ));
    if let Err(e) = policy.ensure_exists().await {
        warn!(error = %e, "failed to ensure policy object exists, continuing with permissive default");
    }

    let metrics = create_metrics(&MetricLabels {
        replica: config.replica_name.clone(),
        namespace: config.namespace.clone(),
        network: config.tenancy.network.clone(),
        pool: config.tenancy.pool_id.clone(),
        application: config.application_type.clone(),
    })?;

    let health_server_handle = {
        let metrics = metrics.clone();
        let credentials = credentials.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(port, metrics, credentials).await {
                warn!(error = %e, "observability server failed");
            }
        })
    };

    let policy_watch_handle = policy.start(shutdown_signal.token());

    let health_prober_handle = config.health_check_endpoint.clone().map(|endpoint| {
        let prober = Arc::new(HealthProber::new(
            endpoint,
            config.health_check_interval,
            config.health_check_timeout,
            policy.health.clone(),
            policy.clone(),
        ));
        prober.start(shutdown_signal.token())
    });

    let coordinator = Arc::new(Coordinator::new(
        lease,
        credentials,
        liaison,
        policy,
        metrics,
        holder_identity,
        config.sleep_interval,
        config.cluster_name.clone(),
        config.tenancy.region.clone(),
        config.tenancy.network.clone(),
        config.tenancy.pool_id.clone(),
    ));

    let mut control_loop_handle = {
        let coordinator = coordinator.clone();
        let token = shutdown_signal.token();
        tokio::spawn(async move { coordinator.run(token).await })
    };

    tokio::select! {
        signal = wait_for_signal() => {
            info!(signal = signal, "initiating graceful shutdown");
        }
        _ = &mut control_loop_handle => {
            warn!("control loop exited unexpectedly");
        }
    }

    shutdown_controller.shutdown();

    info!("stopping background tasks");
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, control_loop_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, policy_watch_handle).await;
    if let Some(handle) = health_prober_handle {
        let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle).await;
    }
    health_server_handle.abort();

    info!("forge-leadership coordinator shut down gracefully");
    Ok(())
}
