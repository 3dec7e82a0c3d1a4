//! Clock & Identity: stable replica identity and the tenancy key that
//! derives lease and policy-object names.

use std::fmt;

/// Recognized bech32 prefix for Cardano pool ids. Pool ids beginning with
/// this prefix get a 10-character short id; anything else gets 8.
const KNOWN_POOL_PREFIX: &str = "pool1";

/// Immutable (namespace, replica-name, process-id) tuple. `replica_name`
/// must be stable across restarts (normally the pod name). Used verbatim,
/// via `Display`, as the lease `holder_identity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaIdentity {
    pub namespace: String,
    pub replica_name: String,
    pub pid: u32,
}

impl ReplicaIdentity {
    pub fn new(namespace: impl Into<String>, replica_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            replica_name: replica_name.into(),
            pid: std::process::id(),
        }
    }
}

impl fmt::Display for ReplicaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.replica_name)
    }
}

/// (network, pool, region) — the isolation unit lease and policy-object
/// names are derived from. Pools on different networks, or different pools
/// on the same network, never collide in lease or policy-object namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenancyKey {
    pub network: String,
    pub pool_id: String,
    pub region: String,
}

impl TenancyKey {
    pub fn new(network: impl Into<String>, pool_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            pool_id: pool_id.into(),
            region: region.into(),
        }
    }

    /// `pool-short` truncation: 10 characters for ids with the recognized
    /// `pool1` prefix, 8 otherwise. This is implemented faithfully to the
    /// original's behavior, collision risk and all — it is flagged as a
    /// known limitation, not silently corrected (see DESIGN.md).
    pub fn pool_short_id(&self) -> String {
        let len = if self.pool_id.starts_with(KNOWN_POOL_PREFIX) {
            10
        } else {
            8
        };
        self.pool_id.chars().take(len).collect()
    }

    /// `"forge-leader-<network>-<pool-short>"`
    pub fn lease_name(&self) -> String {
        format!("forge-leader-{}-{}", self.network, self.pool_short_id())
    }

    /// `"<network>-<pool-short>-<region>"`
    pub fn policy_object_name(&self) -> String {
        format!("{}-{}-{}", self.network, self.pool_short_id(), self.region)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
