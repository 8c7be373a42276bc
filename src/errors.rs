use std::time::Duration;

/// Errors surfaced by [`RateLimiter::execute`](crate::RateLimiter::execute).
///
/// A task's own failure is never reported here; it is part of the task's output.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The entry was still queued when [`RateLimiter::clear`](crate::RateLimiter::clear) ran.
    #[error("rate limiter cleared")]
    Cleared,

    /// The draining worker went away before the task settled (runtime shutdown).
    #[error("rate limiter worker stopped")]
    Stopped,
}

/// Errors that end a single provider attempt.
///
/// Every variant is converted into a failed attempt by the resolver; none of them
/// escapes [`MultiProviderResolver::resolve`](crate::MultiProviderResolver::resolve).
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// Missing base URL or credential. No network call was attempted.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The backend answered, but has nothing for this account.
    #[error("no data: {0}")]
    NoData(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("websocket: {0}")]
    WebSocket(String),

    /// JSON-RPC error object returned by a node.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A network stage did not settle in time.
    #[error("{stage} timeout after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("decode: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The caller cancelled the query.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// Every endpoint of a multi-endpoint provider failed.
    ///
    /// Contains the endpoint names and their individual error messages.
    #[error("all endpoints failed: {0:?}")]
    AllEndpointsFailed(Vec<(String, String)>),
}

impl ProviderError {
    /// True for the expected "nothing indexed for this account" class.
    pub fn is_no_data(&self) -> bool {
        matches!(self, ProviderError::NoData(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

/// Errors raised while reading static configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
