//! Shared shutdown signal: every background task (control loop, policy
//! watch, health prober, observability server) observes one
//! [`CancellationToken`] (spec §5 "Cancellation & timeouts"). Authored
//! fresh — the teacher's own `shutdown.rs` was not present in the
//! retrieval pack, but its API is fully specified by its call sites in
//! `main.rs`/`server/leader.rs` (`shutdown_channel()`, `wait_for_signal()`,
//! `ShutdownController::shutdown()`, `ShutdownSignal::wait()`).

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        self.token.cancelled().await;
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let token = CancellationToken::new();
    (
        ShutdownController {
            token: token.clone(),
        },
        ShutdownSignal { token },
    )
}

/// Waits for SIGTERM (container orchestrators' preferred signal) or
/// SIGINT (Ctrl-C during local development). Returns which signal fired.
#[cfg(unix)]
#[allow(clippy::expect_used)] // failure to install a signal handler is unrecoverable at startup
pub async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM");
            "SIGTERM"
        }
        _ = sigint.recv() => {
            info!("received SIGINT");
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
#[allow(clippy::expect_used)] // failure to install a signal handler is unrecoverable at startup
pub async fn wait_for_signal() -> &'static str {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl-C handler");
    "CTRL_C"
}

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod tests;
