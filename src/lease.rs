//! Lease Manager: acquire/renew/relinquish the local lease, detect takeover
//! of expired leases, retry on optimistic-concurrency conflict.
//!
//! Built the way the teacher's `server::leader::try_acquire_or_renew` is
//! built (direct `coordination.k8s.io/v1` Lease manipulation via
//! `kube::Api<Lease>`), generalized to carry the observed `resourceVersion`
//! through the patch so a concurrent write is detected as a real conflict
//! rather than silently overwritten (spec §4.1 step 6, §9 "Optimistic
//! concurrency").

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ObjectStoreError;

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// The lease as last observed by this replica (spec §3's Lease Record).
#[derive(Debug, Clone, Default)]
pub struct LeaseRecord {
    /// Empty string means vacant.
    pub holder: String,
    pub duration: Duration,
    pub acquire_time: Option<DateTime<Utc>>,
    pub renew_time: Option<DateTime<Utc>>,
    pub transitions: i32,
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    fn from_lease(lease: &Lease) -> Self {
        let spec = lease.spec.as_ref();
        Self {
            holder: spec
                .and_then(|s| s.holder_identity.clone())
                .unwrap_or_default(),
            duration: Duration::from_secs(
                spec.and_then(|s| s.lease_duration_seconds)
                    .unwrap_or(0)
                    .max(0) as u64,
            ),
            acquire_time: spec.and_then(|s| s.acquire_time.as_ref()).map(|t| t.0),
            renew_time: spec.and_then(|s| s.renew_time.as_ref()).map(|t| t.0),
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
            resource_version: lease.metadata.resource_version.clone(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.renew_time {
            Some(renew) => renew + chrono::Duration::from_std(self.duration).unwrap_or_default() < now,
            None => true,
        }
    }
}

/// Exponential backoff with jitter: `min(0.5 * 2^attempt, 30) + uniform(0.1, 0.3) * base`.
fn backoff(attempt: u32) -> Duration {
    let base = 0.5_f64 * 2f64.powi(attempt as i32);
    let capped = base.min(30.0);
    let jitter = rand::thread_rng().gen_range(0.1..0.3) * capped;
    Duration::from_secs_f64(capped + jitter)
}

/// Why this replica is eligible to acquire, per spec §4.1 step 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireReason {
    Renewal,
    Vacant,
    Takeover { previous: String },
}

/// Pure decision over (observed lease, self identity, now) — no I/O, the
/// same kind of extraction the teacher does with `calculate_replica_split`.
/// Returns `None` when the lease is held by someone else and not expired.
pub fn plan_acquisition(
    observed: &LeaseRecord,
    self_id: &str,
    now: DateTime<Utc>,
) -> Option<(AcquireReason, i32)> {
    let is_self = observed.holder == self_id;
    let is_vacant = observed.holder.is_empty();
    let expired = observed.is_expired(now);

    if is_self {
        return Some((AcquireReason::Renewal, observed.transitions));
    }
    if is_vacant {
        return Some((AcquireReason::Vacant, observed.transitions));
    }
    if expired {
        return Some((
            AcquireReason::Takeover {
                previous: observed.holder.clone(),
            },
            observed.transitions + 1,
        ));
    }
    None
}

pub struct LeaseManager {
    api: Api<Lease>,
    lease_name: String,
    namespace: String,
    holder_identity: String,
    duration: Duration,
    cached: Mutex<LeaseRecord>,
}

impl LeaseManager {
    pub fn new(
        client: kube::Client,
        namespace: impl Into<String>,
        lease_name: impl Into<String>,
        holder_identity: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            lease_name: lease_name.into(),
            namespace,
            holder_identity: holder_identity.into(),
            duration,
            cached: Mutex::new(LeaseRecord::default()),
        }
    }

    /// Attempt to acquire or renew the lease for this replica (spec §4.1).
    pub async fn try_acquire(&self) -> Result<bool, ObjectStoreError> {
        let mut attempt = 0;
        loop {
            match self.attempt_once().await {
                Ok(held) => return Ok(held),
                Err(ObjectStoreError::Conflict) if attempt < MAX_ACQUIRE_ATTEMPTS => {
                    let wait = backoff(attempt);
                    debug!(?wait, attempt, "lease patch conflict, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_once(&self) -> Result<bool, ObjectStoreError> {
        let now = Utc::now();
        let lease = self.read_or_create(now).await?;
        let observed = LeaseRecord::from_lease(&lease);

        let Some((reason, new_transitions)) =
            plan_acquisition(&observed, &self.holder_identity, now)
        else {
            *self.cached.lock().await = observed.clone();
            return Ok(false);
        };
        let is_self = reason == AcquireReason::Renewal;
        let is_vacant = reason == AcquireReason::Vacant;

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": observed.resource_version,
            },
            "spec": {
                "holderIdentity": self.holder_identity,
                "acquireTime": if is_self { observed.acquire_time } else { Some(now) },
                "renewTime": now,
                "leaseDurationSeconds": self.duration.as_secs() as i32,
                "leaseTransitions": new_transitions,
            }
        });

        let result = self
            .api
            .patch(&self.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await;

        match result {
            Ok(patched) => {
                let final_record = LeaseRecord::from_lease(&patched);
                let won = final_record.holder == self.holder_identity;
                if won && !is_self && !is_vacant {
                    info!(
                        holder = %self.holder_identity,
                        previous = %observed.holder,
                        "took over expired lease"
                    );
                } else if won && is_vacant {
                    info!(holder = %self.holder_identity, "acquired vacant lease");
                }
                *self.cached.lock().await = final_record.clone();
                Ok(won)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Err(ObjectStoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_or_create(&self, now: DateTime<Utc>) -> Result<Lease, ObjectStoreError> {
        match self.api.get(&self.lease_name).await {
            Ok(lease) => Ok(lease),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                let vacant = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(String::new()),
                        renew_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(now)),
                        lease_duration_seconds: Some(self.duration.as_secs() as i32),
                        lease_transitions: Some(0),
                        ..Default::default()
                    }),
                };
                match self.api.create(&PostParams::default(), &vacant).await {
                    Ok(created) => Ok(created),
                    Err(kube::Error::Api(e2)) if e2.code == 409 => {
                        self.api.get(&self.lease_name).await.map_err(Into::into)
                    }
                    Err(e2) => Err(e2.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear holder if self; idempotent; best-effort (spec §4.1).
    pub async fn forfeit(&self) {
        let cached = self.cached.lock().await.clone();
        if cached.holder != self.holder_identity {
            return;
        }
        let patch = serde_json::json!({
            "spec": { "holderIdentity": "" }
        });
        if let Err(e) = self
            .api
            .patch(&self.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!(error = %e, "forfeit patch failed, ignoring (best-effort)");
        }
    }

    /// Return last known lease state without mutation.
    pub async fn observe(&self) -> LeaseRecord {
        self.cached.lock().await.clone()
    }

    pub fn is_local_leader(&self, record: &LeaseRecord) -> bool {
        record.holder == self.holder_identity
    }
}

#[cfg(test)]
#[path = "lease_test.rs"]
mod tests;
