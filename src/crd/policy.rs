//! The cluster-scoped policy object: the administrator-controlled spec
//! (forge intent, health-check config, time-bounded override) and the
//! coordinator-maintained status (effective state, active leader, health).
//!
//! Built the way the teacher's `crd::rollout::Rollout` is built (derive
//! `CustomResource` + `JsonSchema`, dedicated status type, printcolumns for
//! `kubectl get` ergonomics), but the default-spec shape on creation follows
//! the original `cluster_manager.py`'s `_create_cluster_crd`.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cardano.io",
    version = "v1",
    kind = "ForgePolicy",
    plural = "forgepolicies",
    shortname = "fp",
    status = "ForgePolicyStatus",
    printcolumn = r#"{"name":"ForgeState", "type":"string", "jsonPath":".spec.forgeState"}"#,
    printcolumn = r#"{"name":"Effective", "type":"string", "jsonPath":".status.effectiveState"}"#,
    printcolumn = r#"{"name":"ActiveLeader", "type":"string", "jsonPath":".status.activeLeader"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ForgePolicySpec {
    pub network: NetworkInfo,
    pub pool: PoolInfo,
    pub application: ApplicationInfo,
    pub region: String,
    #[serde(rename = "forgeState", default)]
    pub forge_state: ForgeState,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_policy: Option<OverridePolicy>,
    #[serde(rename = "healthCheck")]
    pub health_check: HealthCheckConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct NetworkInfo {
    pub name: String,
    pub magic: u32,
    pub era: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct PoolInfo {
    pub id: String,
    #[serde(rename = "idHex", default)]
    pub id_hex: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticker: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ApplicationInfo {
    #[serde(rename = "type")]
    pub application_type: String,
    #[serde(default)]
    pub environment: String,
}

/// `forgeState ∈ {Enabled, Disabled, Priority-based}`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ForgeState {
    Enabled,
    Disabled,
    #[default]
    #[serde(rename = "Priority-based")]
    PriorityBased,
}

impl std::fmt::Display for ForgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForgeState::Enabled => write!(f, "Enabled"),
            ForgeState::Disabled => write!(f, "Disabled"),
            ForgeState::PriorityBased => write!(f, "Priority-based"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct OverridePolicy {
    pub enabled: bool,
    #[serde(rename = "forceState", skip_serializing_if = "Option::is_none")]
    pub force_state: Option<ForgeState>,
    #[serde(rename = "forcePriority", skip_serializing_if = "Option::is_none")]
    pub force_priority: Option<i32>,
    pub reason: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default = "default_health_interval")]
    pub interval: u32,
    #[serde(default = "default_health_timeout")]
    pub timeout: u32,
    #[serde(rename = "failureThreshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_health_interval() -> u32 {
    30
}

fn default_health_timeout() -> u32 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

/// Coordinator-maintained status. Spec is never modified by the
/// coordinator; only the local leader patches status.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ForgePolicyStatus {
    #[serde(rename = "effectiveState", skip_serializing_if = "Option::is_none")]
    pub effective_state: Option<ForgeState>,
    #[serde(rename = "effectivePriority", default)]
    pub effective_priority: i32,
    #[serde(rename = "activeLeader", default)]
    pub active_leader: String,
    #[serde(rename = "forgingEnabled", default)]
    pub forging_enabled: bool,
    #[serde(rename = "lastTransition", skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "observedGeneration", skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(rename = "healthStatus", default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct HealthStatus {
    #[serde(default)]
    pub healthy: bool,
    #[serde(rename = "lastProbeTime", skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,
    #[serde(rename = "consecutiveFailures", default)]
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The operator-supplied pool descriptors (`POOL_ID_HEX`/`POOL_NAME`/
/// `POOL_TICKER`) that have no bearing on tenancy isolation — unlike
/// `TenancyKey::pool_id` they are not part of the lease/policy-object name
/// derivation — but must still land in the created `ForgePolicy`'s spec
/// since the coordinator never modifies it afterward (spec §3).
#[derive(Debug, Clone, Default)]
pub struct PoolDescriptor {
    pub id_hex: String,
    pub name: String,
    pub ticker: String,
}

/// Mirrors `_create_cluster_crd`'s default spec shape: a sensible starting
/// point rather than an empty object, populated from configuration rather
/// than hardcoded so the object created on first startup actually reflects
/// this replica's tenancy.
pub fn default_spec(
    tenancy: &crate::identity::TenancyKey,
    priority: i32,
    network_magic: u32,
    pool: &PoolDescriptor,
) -> ForgePolicySpec {
    ForgePolicySpec {
        network: NetworkInfo {
            name: tenancy.network.clone(),
            magic: network_magic,
            era: "conway".to_string(),
        },
        pool: PoolInfo {
            id: tenancy.pool_id.clone(),
            id_hex: pool.id_hex.clone(),
            name: pool.name.clone(),
            ticker: pool.ticker.clone(),
        },
        application: ApplicationInfo {
            application_type: "block-producer".to_string(),
            environment: "production".to_string(),
        },
        region: tenancy.region.clone(),
        forge_state: ForgeState::default(),
        priority,
        override_policy: None,
        health_check: HealthCheckConfig {
            enabled: false,
            endpoint: String::new(),
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            failure_threshold: default_failure_threshold(),
        },
    }
}

/// The result of the pure effective-state computation (spec §4.4 steps 1-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveState {
    pub state: ForgeState,
    pub priority: i32,
    pub reason: &'static str,
}

/// A pure function of (spec, consecutiveFailures, now) — same inputs, same
/// outputs (P9). Not itself async or cluster-aware; the caller supplies the
/// last observed spec and health counter.
pub fn compute_effective_state(
    spec: &ForgePolicySpec,
    consecutive_failures: u32,
    now: DateTime<Utc>,
) -> EffectiveState {
    let base_priority = spec.priority;
    let mut state = spec.forge_state;
    let mut priority = base_priority;
    let mut reason = "base";

    if let Some(ov) = &spec.override_policy {
        if ov.enabled && ov.expires_at > now {
            if let Some(forced) = ov.force_state {
                state = forced;
            }
            if let Some(forced_priority) = ov.force_priority {
                priority = forced_priority;
            }
            return EffectiveState {
                state,
                priority,
                reason: "manual_override",
            };
        }
    }

    if state == ForgeState::PriorityBased {
        let threshold = spec.health_check.failure_threshold;
        if consecutive_failures >= threshold && threshold > 0 {
            priority = base_priority + 100;
            reason = "health_degraded";
        } else if consecutive_failures > 0 {
            priority = base_priority + 10;
            reason = "health_intermittent";
        }
    }

    match state {
        ForgeState::Disabled => reason = "cluster_disabled",
        ForgeState::Enabled => reason = "cluster_enabled",
        ForgeState::PriorityBased => {}
    }

    EffectiveState {
        state,
        priority,
        reason,
    }
}

/// `false` iff `effectiveState == Disabled`; cross-cluster priority
/// arbitration is left to administrator tooling (spec §4.4, §9).
pub fn should_allow_forging(effective: &EffectiveState) -> bool {
    effective.state != ForgeState::Disabled
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
