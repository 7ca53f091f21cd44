//! Bounded, persistent log of protocol events
//!
//! Every decision the flow controller makes (discovery loaded, code
//! received, fallback started, state mismatch, ...) is appended here so a
//! developer can reconstruct what happened across redirects. The log lives
//! in the key-value store under [`DEBUG_LOG_KEY`] and keeps at most
//! `capacity` entries, evicting the oldest first. Each event is also
//! mirrored to `tracing`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::storage::{load_json, save_json, KeyValueStore};

/// Storage slot holding the serialized event list.
pub const DEBUG_LOG_KEY: &str = "tokenprobe-debug-log";

/// Default number of retained events.
pub const DEFAULT_DEBUG_LOG_CAPACITY: usize = 50;

/// Enumerated event kinds, serialized in kebab-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugEventKind {
    Configured,
    ConfigurationError,
    DiscoveryLoaded,
    DiscoveryError,
    DiscoveryValidationError,
    AuthorizationRedirect,
    CodeReceived,
    CodeError,
    StateMismatch,
    TokenReceived,
    TokenExchangeError,
    ManualExchangeStart,
    ManualExchangeSuccess,
    ManualExchangeFail,
    ManualExchangeUnavailable,
    TokenRefreshed,
    TokenRefreshError,
    SessionRestored,
    Logout,
    RevocationError,
    Info,
}

impl DebugEventKind {
    /// True for kinds that describe a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            DebugEventKind::ConfigurationError
                | DebugEventKind::DiscoveryError
                | DebugEventKind::DiscoveryValidationError
                | DebugEventKind::CodeError
                | DebugEventKind::TokenExchangeError
                | DebugEventKind::ManualExchangeFail
                | DebugEventKind::ManualExchangeUnavailable
                | DebugEventKind::TokenRefreshError
                | DebugEventKind::RevocationError
        )
    }

    /// The kebab-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugEventKind::Configured => "configured",
            DebugEventKind::ConfigurationError => "configuration-error",
            DebugEventKind::DiscoveryLoaded => "discovery-loaded",
            DebugEventKind::DiscoveryError => "discovery-error",
            DebugEventKind::DiscoveryValidationError => "discovery-validation-error",
            DebugEventKind::AuthorizationRedirect => "authorization-redirect",
            DebugEventKind::CodeReceived => "code-received",
            DebugEventKind::CodeError => "code-error",
            DebugEventKind::StateMismatch => "state-mismatch",
            DebugEventKind::TokenReceived => "token-received",
            DebugEventKind::TokenExchangeError => "token-exchange-error",
            DebugEventKind::ManualExchangeStart => "manual-exchange-start",
            DebugEventKind::ManualExchangeSuccess => "manual-exchange-success",
            DebugEventKind::ManualExchangeFail => "manual-exchange-fail",
            DebugEventKind::ManualExchangeUnavailable => "manual-exchange-unavailable",
            DebugEventKind::TokenRefreshed => "token-refreshed",
            DebugEventKind::TokenRefreshError => "token-refresh-error",
            DebugEventKind::SessionRestored => "session-restored",
            DebugEventKind::Logout => "logout",
            DebugEventKind::RevocationError => "revocation-error",
            DebugEventKind::Info => "info",
        }
    }
}

impl std::fmt::Display for DebugEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Event classification
    pub kind: DebugEventKind,
    /// Short human-readable summary
    pub message: String,
    /// Optional structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Ring buffer of [`DebugEvent`]s persisted in a [`KeyValueStore`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tokenprobe::auth::debug_log::{DebugEventKind, DebugLog};
/// use tokenprobe::storage::MemoryStore;
///
/// let log = DebugLog::new(Arc::new(MemoryStore::new()), 2);
/// log.record(DebugEventKind::Info, "one", None);
/// log.record(DebugEventKind::Info, "two", None);
/// log.record(DebugEventKind::Info, "three", None);
///
/// let messages: Vec<_> = log.read().into_iter().map(|e| e.message).collect();
/// assert_eq!(messages, vec!["two", "three"]);
/// ```
#[derive(Clone)]
pub struct DebugLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl DebugLog {
    /// Creates a log over `store`. A capacity of zero is raised to one.
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an event, evicting the oldest entries beyond capacity.
    ///
    /// Persistence failures are logged and swallowed: losing a debug entry
    /// must never break the flow being debugged.
    pub fn record(&self, kind: DebugEventKind, message: impl Into<String>, payload: Option<Value>) {
        let event = DebugEvent {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            payload,
        };

        if kind.is_error() {
            tracing::warn!(kind = %event.kind, payload = ?event.payload, "{}", event.message);
        } else {
            tracing::info!(kind = %event.kind, payload = ?event.payload, "{}", event.message);
        }

        let mut events = self.read();
        events.push(event);
        if events.len() > self.capacity {
            let overflow = events.len() - self.capacity;
            events.drain(..overflow);
        }

        if let Err(e) = self.write(&events) {
            tracing::warn!(error = %e, "Failed to persist debug log");
        }
    }

    /// Returns all retained events, oldest first.
    ///
    /// An absent or corrupted slot reads as an empty log.
    pub fn read(&self) -> Vec<DebugEvent> {
        load_json(self.store.as_ref(), DEBUG_LOG_KEY).unwrap_or_default()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when no events are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every event.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(DEBUG_LOG_KEY)
    }

    fn write(&self, events: &[DebugEvent]) -> Result<()> {
        save_json(self.store.as_ref(), DEBUG_LOG_KEY, events)
    }
}
