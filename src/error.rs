//! Error types for TokenProbe
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling. Public functions return
//! [`Result`], an `anyhow` alias, so callers can attach context freely and
//! downcast to [`TokenProbeError`] when they need to branch on the kind.

use thiserror::Error;

/// Why a discovery document could not be loaded.
///
/// The classification drives the human-readable message shown to the user,
/// so it is kept separate from the free-form detail string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailureKind {
    /// The server could not be reached at all (connection refused, DNS, TLS).
    ConnectionRefused,
    /// The server answered 404 for the discovery document.
    NotFound,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Any other failure, including non-404 error statuses and bad JSON.
    Other,
}

impl std::fmt::Display for DiscoveryFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DiscoveryFailureKind::ConnectionRefused => "connection refused",
            DiscoveryFailureKind::NotFound => "not found",
            DiscoveryFailureKind::Timeout => "timeout",
            DiscoveryFailureKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Main error type for TokenProbe operations
///
/// Covers configuration, discovery, the authorization redirect, both token
/// exchange paths, refresh, local storage and the ambient I/O failures.
#[derive(Error, Debug)]
pub enum TokenProbeError {
    /// Missing or placeholder client settings, invalid config files
    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery document unreachable or returned an error status
    #[error("Discovery error ({kind}): {message}")]
    Discovery {
        /// Failure classification
        kind: DiscoveryFailureKind,
        /// HTTP status when the server answered
        status: Option<u16>,
        /// Human-readable message including remediation hints
        message: String,
    },

    /// Discovery document was fetched but failed validation
    #[error("Discovery validation error: {0}")]
    DiscoveryValidation(String),

    /// The authorization server redirected back with `error=`
    #[error("OAuth error: {error} - {description}")]
    Authorization {
        /// Value of the `error` query parameter
        error: String,
        /// Value of `error_description`, empty when absent
        description: String,
    },

    /// Returned `state` differs from the one recorded before the redirect
    #[error("State mismatch: expected {expected}, received {received}")]
    StateMismatch {
        /// State recorded before the redirect, empty when nothing was recorded
        expected: String,
        /// State found on the callback URL
        received: String,
    },

    /// Standard or manual token exchange failed
    #[error("Token exchange error: {0}")]
    Exchange(String),

    /// Manual exchange is not wired for the given provider
    #[error("Manual token exchange is not available for {0}")]
    ManualExchangeUnavailable(String),

    /// Token refresh failed; the session keeps the previous tokens
    #[error("Token refresh error: {0}")]
    Refresh(String),

    /// Refresh was requested without a refresh token
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// Another flow step is already in flight
    #[error("An authentication step is already in progress")]
    Busy,

    /// Non-success HTTP status from a provider endpoint
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Loopback callback receiver failures
    #[error("Callback error: {0}")]
    Callback(String),

    /// Key-value store failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for TokenProbe operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
