//! Producer Liaison: socket-presence probe, PID discovery, best-effort
//! reload signal with cross-container fallback, and the startup-phase
//! state machine.
//!
//! Grounded in `forgemanager.py`'s `discover_cardano_node_pid`,
//! `send_sighup_to_cardano_node`, and `is_node_in_startup_phase`. PID
//! discovery uses the `sysinfo` crate (added per `other_examples/` — see
//! DESIGN.md — rather than a hand-rolled `/proc` scan) and signal delivery
//! uses `nix::sys::signal::kill`, in place of Python's `psutil`/`os.kill`.

use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Delivered,
    SkippedCrossContainer,
    PermissionDenied,
}

pub struct ProducerLiaison {
    socket_path: PathBuf,
    process_name: String,
    disable_socket_check: bool,
    wait_timeout: Duration,
    started_at: Instant,
    timeout_logged: AtomicBool,
    /// `true` once the socket has been observed ready at least once.
    in_startup: AtomicBool,
    cached_pid: AtomicU32,
}

const NO_PID: u32 = 0;

impl ProducerLiaison {
    pub fn new(socket_path: impl Into<PathBuf>, process_name: impl Into<String>) -> Self {
        Self::with_socket_check(socket_path, process_name, false, Duration::from_secs(600))
    }

    /// `disable_socket_check` bypasses the startup-phase gate entirely
    /// (`DISABLE_SOCKET_CHECK`, spec §6, for test/dev setups with no real
    /// producer). `wait_timeout` bounds how long the startup phase is
    /// expected to last before a single warning is logged.
    pub fn with_socket_check(
        socket_path: impl Into<PathBuf>,
        process_name: impl Into<String>,
        disable_socket_check: bool,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            process_name: process_name.into(),
            disable_socket_check,
            wait_timeout,
            started_at: Instant::now(),
            timeout_logged: AtomicBool::new(false),
            in_startup: AtomicBool::new(true),
            cached_pid: AtomicU32::new(NO_PID),
        }
    }

    /// True iff the configured socket path exists and is a socket, or
    /// socket gating has been disabled entirely.
    pub fn is_socket_ready(&self) -> bool {
        if self.disable_socket_check {
            return true;
        }
        std::fs::metadata(&self.socket_path)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false)
    }

    /// Scan live processes for a matching executable name or cmdline
    /// substring (spec §4.3).
    fn discover_pid(&self) -> Option<u32> {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        for (pid, process) in system.processes() {
            if process.name().to_string_lossy() == self.process_name {
                return Some(pid.as_u32());
            }
            let cmdline_matches = process
                .cmd()
                .iter()
                .any(|arg| arg.to_string_lossy().contains(&self.process_name));
            if cmdline_matches {
                return Some(pid.as_u32());
            }
        }
        None
    }

    fn cached_or_discovered_pid(&self) -> Option<u32> {
        let cached = self.cached_pid.load(Ordering::SeqCst);
        if cached != NO_PID && pid_exists(cached) {
            return Some(cached);
        }
        let discovered = self.discover_pid();
        if let Some(pid) = discovered {
            self.cached_pid.store(pid, Ordering::SeqCst);
        } else {
            self.cached_pid.store(NO_PID, Ordering::SeqCst);
        }
        discovered
    }

    /// Attempt to signal the producer to reload credentials. Returns
    /// `false` only on a genuine permission error; the cross-container
    /// fallback is intentionally not an error (spec §4.3, §7).
    pub fn notify_reload(&self, reason: &str) -> ReloadOutcome {
        let Some(pid) = self.cached_or_discovered_pid() else {
            info!(reason, "cannot signal producer (cross-container setup), credentials will still take effect");
            return ReloadOutcome::SkippedCrossContainer;
        };

        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGHUP) {
            Ok(()) => {
                info!(pid, reason, "sent SIGHUP to producer");
                ReloadOutcome::Delivered
            }
            Err(nix::errno::Errno::ESRCH) => {
                warn!(pid, "producer process vanished, clearing cached pid");
                self.cached_pid.store(NO_PID, Ordering::SeqCst);
                ReloadOutcome::SkippedCrossContainer
            }
            Err(nix::errno::Errno::EPERM) => {
                warn!(pid, "permission denied sending SIGHUP to producer");
                ReloadOutcome::PermissionDenied
            }
            Err(e) => {
                warn!(pid, error = %e, "unexpected error signalling producer");
                ReloadOutcome::PermissionDenied
            }
        }
    }

    /// Stateful startup-phase predicate. Returns `true` while the producer
    /// has not yet shown a stable socket, or after a previously-stable
    /// socket disappears (spec §4.3's state machine).
    pub fn startup_phase_active(&self) -> bool {
        self.poll_phase().1
    }

    /// Same predicate as [`Self::startup_phase_active`], but also reports
    /// whether this call observed a `Running -> InStartup` edge — the
    /// control loop must forfeit the lease and retract credentials exactly
    /// once when that edge fires (spec §4.3's mandated side effect), not on
    /// every subsequent iteration spent in startup.
    pub fn poll_phase(&self) -> (bool /* just_entered_startup */, bool /* in_startup */) {
        if !self.is_socket_ready() {
            let was_running = !self.in_startup.swap(true, Ordering::SeqCst);
            if was_running {
                info!("producer socket disappeared, re-entering startup phase");
                self.timeout_logged.store(false, Ordering::SeqCst);
            }
            if self.started_at.elapsed() > self.wait_timeout
                && !self.timeout_logged.swap(true, Ordering::SeqCst)
            {
                warn!(
                    timeout_secs = self.wait_timeout.as_secs(),
                    "producer socket still not ready past configured wait timeout"
                );
            }
            return (was_running, true);
        }

        if self.in_startup.swap(false, Ordering::SeqCst) {
            info!("producer startup phase complete, socket is ready and stable");
            if let Some(pid) = self.discover_pid() {
                self.cached_pid.store(pid, Ordering::SeqCst);
                debug!(pid, "cached producer pid");
            } else {
                info!("running cross-container, process signalling unavailable");
            }
        }
        (false, false)
    }
}

fn pid_exists(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "liaison_test.rs"]
mod tests;
