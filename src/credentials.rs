//! Credential Reconciler: bring the on-disk credential files into the
//! desired state with atomic writes and restrictive permissions.
//!
//! Grounded in the original `forgemanager.py`'s `ensure_secrets`/
//! `copy_secret`/`files_identical`/`remove_file`/
//! `provision_startup_credentials`. Diverges from the original on one
//! point, intentionally: `copy_secret` there writes via `shutil.copy2`
//! straight onto the target path, which is not atomic. Here every write
//! goes to a sibling temp file and is `rename`d into place, per the
//! explicit atomic-write requirement this was distilled from.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::CredentialSlot;

const IDENTITY_COMPARE_LIMIT: u64 = 1024 * 1024;
const MTIME_TOLERANCE_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOperation {
    Copy,
    Remove,
}

pub struct CredentialReconciler {
    slots: Vec<CredentialSlot>,
}

impl CredentialReconciler {
    pub fn new(slots: [CredentialSlot; 3]) -> Self {
        Self {
            slots: slots.to_vec(),
        }
    }

    /// Bring target paths into the desired state (spec §4.2). Returns
    /// `true` iff at least one file was written or removed; the caller is
    /// responsible for notifying the producer (P3).
    pub fn reconcile(&self, desired_present: bool) -> (bool, Vec<(CredentialOperation, &'static str)>) {
        let mut changed = false;
        let mut ops = Vec::new();

        for slot in &self.slots {
            let src = Path::new(&slot.source);
            let tgt = Path::new(&slot.target);

            if desired_present {
                if !tgt.exists() || !files_identical(src, tgt) {
                    match atomic_copy(src, tgt) {
                        Ok(()) => {
                            info!(file = slot.name, src = %slot.source, tgt = %slot.target, "credential written");
                            changed = true;
                            ops.push((CredentialOperation::Copy, slot.name));
                        }
                        Err(e) => {
                            warn!(file = slot.name, error = %e, "failed to write credential");
                        }
                    }
                } else {
                    debug!(file = slot.name, "credential already identical, skipping");
                }
            } else if tgt.exists() {
                match fs::remove_file(tgt) {
                    Ok(()) => {
                        info!(file = slot.name, tgt = %slot.target, "credential removed");
                        changed = true;
                        ops.push((CredentialOperation::Remove, slot.name));
                    }
                    Err(e) => {
                        warn!(file = slot.name, error = %e, "failed to remove credential");
                    }
                }
            }
        }

        (changed, ops)
    }

    /// Unconditional copy-if-missing, used before the producer opens its
    /// socket. Does not compare or overwrite existing targets.
    pub fn provision_startup(&self) -> bool {
        let mut success = true;
        for slot in &self.slots {
            let tgt = Path::new(&slot.target);
            if tgt.exists() {
                debug!(file = slot.name, "startup credential already present");
                continue;
            }
            let src = Path::new(&slot.source);
            if let Err(e) = atomic_copy(src, tgt) {
                warn!(file = slot.name, error = %e, "failed to provision startup credential");
                success = false;
            }
        }
        success
    }

    /// True iff every target credential path exists with size > 0 (P8).
    pub fn all_present(&self) -> bool {
        self.missing_slots().is_empty()
    }

    /// Names of the slots not yet present with size > 0, for a diagnostic
    /// `/startup-status` message.
    pub fn missing_slots(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| {
                fs::metadata(&slot.target)
                    .map(|m| m.len() == 0)
                    .unwrap_or(true)
            })
            .map(|slot| slot.name)
            .collect()
    }
}

fn atomic_copy(src: &Path, tgt: &Path) -> io::Result<()> {
    let bytes = fs::read(src)?;
    if let Some(parent) = tgt.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_temp_path(tgt);
    fs::write(&tmp, &bytes)?;
    fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    fs::rename(&tmp, tgt)?;
    Ok(())
}

fn sibling_temp_path(tgt: &Path) -> PathBuf {
    let file_name = tgt
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credential".to_string());
    let tmp_name = format!(".{file_name}.{}.tmp", std::process::id());
    tgt.with_file_name(tmp_name)
}

/// Identity test: same size AND (mtime within 1s OR content-equal for
/// files < 1 MiB; larger files accept the size+mtime proxy).
fn files_identical(a: &Path, b: &Path) -> bool {
    let (meta_a, meta_b) = match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return false,
    };

    if meta_a.len() != meta_b.len() {
        return false;
    }

    if mtimes_within_tolerance(&meta_a, &meta_b) {
        return true;
    }

    if meta_a.len() < IDENTITY_COMPARE_LIMIT {
        return fs::read(a).ok() == fs::read(b).ok();
    }

    false
}

fn mtimes_within_tolerance(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    let (ma, mb) = match (a.modified(), b.modified()) {
        (Ok(ma), Ok(mb)) => (ma, mb),
        _ => return false,
    };
    let diff = if ma > mb {
        ma.duration_since(mb)
    } else {
        mb.duration_since(ma)
    };
    diff.map(|d| d.as_secs() < MTIME_TOLERANCE_SECS)
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
