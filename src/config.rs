//! Configuration management for TokenProbe
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Provider settings entered with `tokenprobe configure` live in the key-value
//! store, not here. The `auth.keycloak` / `auth.entra` sections of the YAML
//! file seed that store when it has nothing saved for the provider yet.

use crate::api::ApiConfig;
use crate::auth::debug_log::DEFAULT_DEBUG_LOG_CAPACITY;
use crate::auth::provider::{EntraConfig, KeycloakConfig, ProviderKind};
use crate::error::{Result, TokenProbeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for TokenProbe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth flow behavior and seed provider settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// API under test
    #[serde(default)]
    pub api: ApiConfig,
    /// Where the key-value store lives
    #[serde(default)]
    pub storage: StorageConfig,
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub debug_log: DebugLogConfig,
}

/// OAuth flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Provider to make current on startup
    #[serde(default)]
    pub provider: Option<ProviderKind>,

    #[serde(default)]
    pub keycloak: Option<KeycloakConfig>,

    #[serde(default)]
    pub entra: Option<EntraConfig>,

    /// Abort the callback on a `state` mismatch instead of continuing
    #[serde(default)]
    pub strict_state: bool,

    /// Loopback host for the CLI callback listener
    #[serde(default = "default_callback_host")]
    pub callback_host: String,

    /// Loopback port for the CLI callback listener
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// Launch the system browser on login
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_callback_host() -> String {
    "127.0.0.1".to_string()
}

fn default_callback_port() -> u16 {
    4200
}

fn default_open_browser() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: None,
            keycloak: None,
            entra: None,
            strict_state: false,
            callback_host: default_callback_host(),
            callback_port: default_callback_port(),
            open_browser: default_open_browser(),
        }
    }
}

impl AuthConfig {
    /// Origin the loopback listener serves, e.g. `http://127.0.0.1:4200`.
    pub fn callback_origin(&self) -> String {
        format!("http://{}:{}", self.callback_host, self.callback_port)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory; the platform data directory when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Accept self-signed certificates (local Keycloak instances)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Builds the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .user_agent(concat!("tokenprobe/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| TokenProbeError::Config(format!("Failed to create HTTP client: {}", e)).into())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,

    /// Also append logs to this file
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_log_level() -> String {
    "tokenprobe=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Debug event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLogConfig {
    /// Events kept before the oldest is evicted
    #[serde(default = "default_debug_log_capacity")]
    pub capacity: usize,
}

fn default_debug_log_capacity() -> usize {
    DEFAULT_DEBUG_LOG_CAPACITY
}

impl Default for DebugLogConfig {
    fn default() -> Self {
        Self {
            capacity: default_debug_log_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TokenProbeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TokenProbeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider) = std::env::var("TOKENPROBE_PROVIDER") {
            match provider.parse::<ProviderKind>() {
                Ok(kind) => self.auth.provider = Some(kind),
                Err(_) => tracing::warn!("Invalid TOKENPROBE_PROVIDER: {}", provider),
            }
        }

        if let Ok(strict) = std::env::var("TOKENPROBE_STRICT_STATE") {
            match strict.parse::<bool>() {
                Ok(v) => self.auth.strict_state = v,
                Err(_) => tracing::warn!("Invalid TOKENPROBE_STRICT_STATE: {}", strict),
            }
        }

        if let Ok(port) = std::env::var("TOKENPROBE_CALLBACK_PORT") {
            if let Ok(v) = port.parse::<u16>() {
                self.auth.callback_port = v;
            } else {
                tracing::warn!("Invalid TOKENPROBE_CALLBACK_PORT: {}", port);
            }
        }

        if let Ok(base_url) = std::env::var("TOKENPROBE_API_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(path) = std::env::var("TOKENPROBE_STORE_PATH") {
            self.storage.path = Some(path);
        }

        if let Ok(timeout) = std::env::var("TOKENPROBE_TIMEOUT_SECONDS") {
            if let Ok(v) = timeout.parse::<u64>() {
                self.http.timeout_seconds = v;
            } else {
                tracing::warn!("Invalid TOKENPROBE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(level) = std::env::var("TOKENPROBE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("TOKENPROBE_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => tracing::warn!("Invalid TOKENPROBE_JSON_LOGS: {}", json_logs),
            }
        }

        if let Ok(log_file) = std::env::var("TOKENPROBE_LOG_FILE") {
            self.logging.file_path = Some(log_file);
        }

        if let Ok(capacity) = std::env::var("TOKENPROBE_DEBUG_LOG_CAPACITY") {
            if let Ok(v) = capacity.parse::<usize>() {
                self.debug_log.capacity = v;
            } else {
                tracing::warn!("Invalid TOKENPROBE_DEBUG_LOG_CAPACITY: {}", capacity);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(store) = cli.store.as_ref() {
            self.storage.path = Some(store.clone());
        }
        if cli.verbose {
            self.logging.level = "tokenprobe=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 {
            return Err(
                TokenProbeError::Config("http.timeout_seconds must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.debug_log.capacity == 0 {
            return Err(TokenProbeError::Config(
                "debug_log.capacity must be greater than 0".to_string(),
            )
            .into());
        }

        if self.auth.callback_host.is_empty() {
            return Err(
                TokenProbeError::Config("auth.callback_host cannot be empty".to_string()).into(),
            );
        }

        url::Url::parse(&self.api.base_url).map_err(|e| {
            TokenProbeError::Config(format!("Invalid api.base_url {}: {}", self.api.base_url, e))
        })?;

        if let Some(keycloak) = self.auth.keycloak.as_ref() {
            if !keycloak.issuer.is_empty() {
                url::Url::parse(&keycloak.issuer).map_err(|e| {
                    TokenProbeError::Config(format!(
                        "Invalid auth.keycloak.issuer {}: {}",
                        keycloak.issuer, e
                    ))
                })?;
            }
        }

        Ok(())
    }
}
