//! Error types for the DDNS updater
//!
//! One error enum is shared by the core, the public IP fetchers and the
//! provider drivers so the engine can classify failures (ban, cancellation,
//! malformed responses) without knowing which crate produced them.

use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS updater
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence (updates.json) errors
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Public IP fetcher errors
    #[error("public IP error: {0}")]
    PublicIp(String),

    /// Hostname resolution errors
    #[error("resolver error: {0}")]
    Resolver(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The remote answered with a status code we do not handle
    #[error("bad HTTP status: {status}: {body}")]
    BadHttpStatus {
        /// Status code received
        status: u16,
        /// Response body, on a single line
        body: String,
    },

    /// Authentication errors (bad credentials, 401/403)
    #[error("bad authentication: {0}")]
    Authentication(String),

    /// Rate limiting errors (429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The service banned us (abuse, banned user agent)
    #[error("banned due to abuse: {0}")]
    Banned(String),

    /// Unknown response from a remote service
    #[error("unknown response: {0}")]
    UnknownResponse(String),

    /// No IP address found in a response
    #[error("no IP address in response: {0}")]
    NoIpInResponse(String),

    /// The IP address sent does not match the one received back
    #[error("mismatching IP address received: sent {sent} but received {received}")]
    IpMismatch {
        /// IP address sent to the provider
        sent: IpAddr,
        /// IP address the provider answered with
        received: IpAddr,
    },

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("{provider}: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A lifecycle service failed to start, stop or run
    #[error("{service}: {message}")]
    Service {
        /// Service name
        service: String,
        /// Error message
        message: String,
    },

    /// The operation was cancelled because the engine is shutting down
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a public IP error
    pub fn public_ip(msg: impl Into<String>) -> Self {
        Self::PublicIp(msg.into())
    }

    /// Create a resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a bad HTTP status error
    pub fn bad_status(status: u16, body: impl Into<String>) -> Self {
        Self::BadHttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a ban error
    pub fn banned(msg: impl Into<String>) -> Self {
        Self::Banned(msg.into())
    }

    /// Create an unknown response error
    pub fn unknown_response(msg: impl Into<String>) -> Self {
        Self::UnknownResponse(msg.into())
    }

    /// Create a "no IP in response" error
    pub fn no_ip(msg: impl Into<String>) -> Self {
        Self::NoIpInResponse(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a lifecycle service error
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether this error should freeze the record for the ban period.
    pub fn is_ban(&self) -> bool {
        matches!(
            self,
            Self::Banned(_) | Self::Authentication(_) | Self::RateLimited(_)
        )
    }

    /// Whether this error comes from a shutdown in progress.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Map an HTTP status to the matching error kind.
    ///
    /// 401/403 are authentication failures, 429 is rate limiting, anything
    /// else is a bad status carrying the response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::auth(format!("HTTP status {status}: {body}")),
            429 => Self::rate_limited(format!("HTTP status {status}: {body}")),
            _ => Self::bad_status(status, body),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
