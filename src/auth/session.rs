//! Session state owned by the flow controller
//!
//! [`AuthSession`] is published through a `tokio::sync::watch` channel: the
//! controller holds the only sender, everyone else gets read-only receivers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;

/// Storage slot for the last successful [`TokenSet`].
pub const TOKEN_SET_KEY: &str = "tokenprobe-token-set";

/// Tokens shorter than this are treated as absent.
pub const MIN_ACCESS_TOKEN_LEN: usize = 10;

/// Where the authorization-code flow currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowState {
    #[default]
    Unconfigured,
    Configured,
    DiscoveryLoading,
    AwaitingRedirect,
    CallbackReceived,
    ExchangePending,
    Authenticated,
    Failed,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FlowState::Unconfigured => "unconfigured",
            FlowState::Configured => "configured",
            FlowState::DiscoveryLoading => "discovery-loading",
            FlowState::AwaitingRedirect => "awaiting-redirect",
            FlowState::CallbackReceived => "callback-received",
            FlowState::ExchangePending => "exchange-pending",
            FlowState::Authenticated => "authenticated",
            FlowState::Failed => "failed",
        };
        f.write_str(label)
    }
}

fn bearer() -> String {
    "Bearer".to_string()
}

/// Tokens obtained from an exchange or refresh.
///
/// Expiry is stored as an absolute instant; [`TokenSet::expires_in`] derives
/// the remaining duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Builds a token set from a token response.
    ///
    /// `expires_in` is relative to `now`; `token_type` is always normalized
    /// to `Bearer`.
    pub fn from_response_parts(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: Option<u64>,
        scope: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        Self {
            access_token,
            refresh_token,
            id_token,
            token_type: bearer(),
            expires_at,
            scope,
        }
    }

    /// Remaining lifetime at `now`, floored at zero. `None` when unknown.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|at| std::cmp::max(at - now, Duration::zero()))
    }

    /// True when the access token is present and long enough to be real.
    pub fn has_usable_access_token(&self) -> bool {
        has_usable_access_token(Some(&self.access_token))
    }
}

/// Checks the "code present implies usable token" post-condition.
pub fn has_usable_access_token(token: Option<&str>) -> bool {
    token
        .map(|t| t.trim().len() >= MIN_ACCESS_TOKEN_LEN)
        .unwrap_or(false)
}

/// True when `token` decodes and its `exp` claim lies after `now`.
///
/// Decode failures and a missing `exp` both count as invalid.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tokenprobe::auth::session::is_token_valid_at;
///
/// // payload {"exp":1700000000}
/// let token = "eyJhbGciOiJub25lIn0.eyJleHAiOjE3MDAwMDAwMDB9.sig";
/// assert!(is_token_valid_at(token, Utc.timestamp_opt(1_699_999_999, 0).unwrap()));
/// assert!(!is_token_valid_at(token, Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
/// assert!(!is_token_valid_at("opaque", Utc::now()));
/// ```
pub fn is_token_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    jwt::decode(token)
        .and_then(|decoded| decoded.claim_f64("exp"))
        .map(|exp| exp.floor() as i64 > now.timestamp())
        .unwrap_or(false)
}

/// Snapshot of the authentication session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub authenticated: bool,
    pub token_set: Option<TokenSet>,
    /// Most specific user-facing error from the last failed step
    pub error_message: Option<String>,
    /// True while a flow step is in flight
    pub processing: bool,
    pub state: FlowState,
}

impl AuthSession {
    pub fn access_token(&self) -> Option<&str> {
        self.token_set.as_ref().map(|t| t.access_token.as_str())
    }

    /// Computed validity of the current access token.
    pub fn has_valid_token(&self) -> bool {
        self.access_token()
            .map(|t| is_token_valid_at(t, Utc::now()))
            .unwrap_or(false)
    }
}
