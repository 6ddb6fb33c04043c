//! Error types and conversions

use thiserror::Error;

use crate::RateLimitDimension;

/// Persistence-layer error taxonomy.
///
/// The store classifies every failure into one of these kinds and retries
/// nothing itself; callers decide what to do with each kind.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Gateway-level error taxonomy surfaced by the admission pipeline.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed")]
    Unauthenticated,

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("no alias or remap rule resolves and no provider has keys")]
    NoRouteToProvider,

    #[error("rate limit exceeded ({0})")]
    RateLimited(RateLimitDimension),

    #[error("no API key available")]
    NoKeyAvailable,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt state: {0}")]
    Corrupt(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Machine-readable kind slug used in the `error` field of response
    /// bodies.
    pub fn slug(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::InvalidModel(_) => "invalid_model",
            GatewayError::NoRouteToProvider => "no_route_to_provider",
            GatewayError::RateLimited(_) => "rate_limited",
            GatewayError::NoKeyAvailable => "no_key_available",
            GatewayError::Transient(_) => "transient",
            GatewayError::Conflict(_) => "conflict",
            GatewayError::Corrupt(_) => "corrupt",
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            // A missing row at admission time means the request cannot be
            // routed, not that the store misbehaved.
            StoreError::NotFound => GatewayError::NoRouteToProvider,
            StoreError::Conflict(msg) => GatewayError::Conflict(msg),
            StoreError::Transient(msg) => GatewayError::Transient(msg),
            StoreError::Corrupt(msg) => GatewayError::Corrupt(msg),
        }
    }
}
