//! Language-neutral error taxonomy for the object-store boundary.
//!
//! Every call into the orchestration platform collapses to one of these
//! kinds so the control loop can branch on the tag rather than catching
//! broad exception classes (spec §7/§9).

use thiserror::Error;

/// The sum type the control loop's retry policy branches on.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Transient network/server error; safe to retry with backoff.
    #[error("transient object-store error: {0}")]
    Transient(#[source] kube::Error),

    /// A write lost an optimistic-concurrency race.
    #[error("optimistic-concurrency conflict")]
    Conflict,

    /// A watch stream's resource version is too old; the client must re-list.
    #[error("watch resource version too old, re-list required")]
    Gone,

    /// The requested object does not exist.
    #[error("object not found")]
    NotFound,

    /// Anything else: surfaced, not retried.
    #[error("permanent object-store error: {0}")]
    Permanent(#[source] kube::Error),
}

impl From<kube::Error> for ObjectStoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) => match resp.code {
                404 => ObjectStoreError::NotFound,
                409 => ObjectStoreError::Conflict,
                410 => ObjectStoreError::Gone,
                429 | 500..=599 => ObjectStoreError::Transient(err),
                _ => ObjectStoreError::Permanent(err),
            },
            kube::Error::Service(_) | kube::Error::HyperError(_) => {
                ObjectStoreError::Transient(err)
            }
            _ => ObjectStoreError::Permanent(err),
        }
    }
}

impl ObjectStoreError {
    /// True for kinds the caller should retry locally with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Transient(_) | ObjectStoreError::Conflict
        )
    }
}

/// Startup-fatal configuration problems. The process exits non-zero before
/// entering the control loop; never used once the loop is running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("network magic mismatch for known network {network}: expected {expected}, got {actual}")]
    NetworkMagicMismatch {
        network: String,
        expected: u32,
        actual: u32,
    },
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
