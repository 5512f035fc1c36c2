use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::error::StoreError;

/// Errors surfaced by the bridge's caller-facing API.
///
/// The variants follow a small taxonomy: accessing the cache before login
/// (`CacheNotReady`), lookups with no record and no route to obtain one
/// (`NotFound`), features the backing protocol does not offer
/// (`Unsupported`), and failures bubbling up from the gateway or the
/// persistent store. Transient upstream failures are retried internally and
/// never reach the caller as errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cache manager is not ready (called from {0})")]
    CacheNotReady(&'static str),

    #[error("no logged-in account")]
    NotLoggedIn,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("operation not supported by the gateway protocol: {0}")]
    Unsupported(&'static str),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed gateway payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
