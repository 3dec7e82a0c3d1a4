//! Bootstrap / env parsing. Mirrors the teacher's `LeaderConfig::from_env`
//! pattern (`server/leader.rs`), generalized to every key in the
//! configuration surface, with the startup-fatal validation the original
//! `forgemanager.py` performs inline at module load.

use std::time::Duration;

use crate::error::ConfigError;
use crate::identity::{ReplicaIdentity, TenancyKey};

fn env_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &'static str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

/// One (source, target) credential path pair. Three of these make up the
/// credential set (spec §3's signing-key-A, signing-key-B, operational
/// certificate).
#[derive(Debug, Clone)]
pub struct CredentialSlot {
    pub name: &'static str,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub namespace: String,
    pub replica_name: String,
    pub lease_name_override: Option<String>,
    pub lease_duration: Duration,
    pub sleep_interval: Duration,

    pub socket_path: String,
    pub socket_wait_timeout: Duration,
    pub disable_socket_check: bool,

    pub credentials: [CredentialSlot; 3],
    pub producer_process_name: String,

    pub tenancy: TenancyKey,
    pub pool_id_hex: String,
    pub pool_name: String,
    pub pool_ticker: String,
    pub network_magic: u32,
    pub application_type: String,
    pub priority: i32,

    pub enable_cluster_management: bool,
    pub cluster_name: String,
    pub health_check_endpoint: Option<String>,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,

    pub metrics_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let namespace = env_or("NAMESPACE", "default");
        let replica_name = std::env::var("REPLICA_NAME")
            .or_else(|_| std::env::var("POD_NAME"))
            .map_err(|_| ConfigError::MissingVar("REPLICA_NAME"))?;

        let network = env_or("CARDANO_NETWORK", "mainnet");
        let pool_id = std::env::var("POOL_ID").map_err(|_| ConfigError::MissingVar("POOL_ID"))?;
        let region = std::env::var("REGION").map_err(|_| ConfigError::MissingVar("REGION"))?;
        let tenancy = TenancyKey::new(network.clone(), pool_id, region);

        let network_magic: u32 = env_parse("NETWORK_MAGIC", 764_824_073)?;
        validate_network_magic(&network, network_magic)?;

        let credentials = [
            CredentialSlot {
                name: "kes",
                source: env_or("SOURCE_A", "/secrets/kes.skey"),
                target: env_or("TARGET_A", "/opt/cardano/secrets/kes.skey"),
            },
            CredentialSlot {
                name: "vrf",
                source: env_or("SOURCE_B", "/secrets/vrf.skey"),
                target: env_or("TARGET_B", "/opt/cardano/secrets/vrf.skey"),
            },
            CredentialSlot {
                name: "opcert",
                source: env_or("SOURCE_C", "/secrets/node.cert"),
                target: env_or("TARGET_C", "/opt/cardano/secrets/node.cert"),
            },
        ];

        Ok(Config {
            namespace,
            replica_name,
            lease_name_override: std::env::var("LEASE_NAME").ok(),
            lease_duration: Duration::from_secs(env_parse("LEASE_DURATION", 15)?),
            sleep_interval: Duration::from_secs(env_parse("SLEEP_INTERVAL", 5)?),

            socket_path: env_or("SOCKET_PATH", "/ipc/node.socket"),
            socket_wait_timeout: Duration::from_secs(env_parse("SOCKET_WAIT_TIMEOUT", 600)?),
            disable_socket_check: env_bool("DISABLE_SOCKET_CHECK", false),

            credentials,
            producer_process_name: env_or("PRODUCER_PROCESS_NAME", "cardano-node"),

            tenancy,
            pool_id_hex: env_or("POOL_ID_HEX", ""),
            pool_name: env_or("POOL_NAME", ""),
            pool_ticker: env_or("POOL_TICKER", ""),
            network_magic,
            application_type: env_or("APPLICATION_TYPE", "block-producer"),
            priority: env_parse("PRIORITY", 0)?,

            enable_cluster_management: env_bool("ENABLE_CLUSTER_MANAGEMENT", true),
            cluster_name: env_or("CLUSTER_NAME", "default-cluster"),
            health_check_endpoint: std::env::var("HEALTH_CHECK_ENDPOINT").ok(),
            health_check_interval: Duration::from_secs(env_parse("HEALTH_CHECK_INTERVAL", 30)?),
            health_check_timeout: Duration::from_secs(env_parse("HEALTH_CHECK_TIMEOUT", 10)?),

            metrics_port: env_parse("METRICS_PORT", 8000)?,
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }

    pub fn lease_name(&self) -> String {
        self.lease_name_override
            .clone()
            .unwrap_or_else(|| self.tenancy.lease_name())
    }

    pub fn replica_identity(&self) -> ReplicaIdentity {
        ReplicaIdentity::new(self.namespace.clone(), self.replica_name.clone())
    }
}

/// For known network names the configured magic must match exactly
/// (spec §6's "Network-magic validation"); unknown names accept any magic.
fn validate_network_magic(network: &str, magic: u32) -> Result<(), ConfigError> {
    let expected = match network {
        "mainnet" => 764_824_073,
        "preprod" => 1,
        "preview" => 2,
        _ => return Ok(()),
    };
    if magic != expected {
        return Err(ConfigError::NetworkMagicMismatch {
            network: network.to_string(),
            expected,
            actual: magic,
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
