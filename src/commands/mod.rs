//! Command handlers for TokenProbe
//!
//! Each submodule handles one group of CLI commands. [`AppContext`] wires the
//! store, HTTP client, navigator and flow controller together for them.

use std::sync::Arc;

use colored::Colorize;
use url::Url;

use crate::api::ApiConfig;
use crate::auth::client::StandardOidcClient;
use crate::auth::manual_exchange::ManualTokenExchange;
use crate::auth::navigator::SystemBrowser;
use crate::auth::settings::{ConfigStore, StoredSettings};
use crate::auth::AuthController;
use crate::config::Config;
use crate::error::{Result, TokenProbeError};
use crate::storage::{KeyValueStore, SledStore};

pub mod api;
pub mod debug_log;
pub mod inspect;
pub mod session;
pub mod settings;

/// Everything a command handler needs.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub http: Arc<reqwest::Client>,
    pub navigator: Arc<SystemBrowser>,
    pub controller: AuthController,
}

impl AppContext {
    /// Opens the configured store and builds the controller around it.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or the HTTP client cannot
    /// be built
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match config.storage.path.as_deref() {
            Some(path) => Arc::new(SledStore::open(path)?),
            None => Arc::new(SledStore::open_default()?),
        };
        Self::with_store(config, store)
    }

    /// Builds the context over an existing store.
    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let http = Arc::new(config.http.build_client()?);
        let origin = Url::parse(&config.auth.callback_origin())
            .map_err(|e| TokenProbeError::Config(format!("Invalid callback origin: {}", e)))?;
        let navigator = Arc::new(SystemBrowser::new(origin, config.auth.open_browser));

        seed_settings(&ConfigStore::new(store.clone()), &config)?;

        let controller = AuthController::new(
            Arc::new(StandardOidcClient::new(http.clone())),
            ManualTokenExchange::new(http.clone()),
            store.clone(),
            navigator.clone(),
        )
        .with_strict_state(config.auth.strict_state)
        .with_debug_log_capacity(config.debug_log.capacity);

        Ok(Self {
            config,
            store,
            http,
            navigator,
            controller,
        })
    }

    /// API settings: the stored ones when present, otherwise the config file's.
    pub fn api_config(&self) -> ApiConfig {
        self.controller
            .settings()
            .get_config()
            .map(|s| s.api)
            .unwrap_or_else(|| self.config.api.clone())
    }
}

/// Copies provider settings from the config file into an empty store.
fn seed_settings(settings: &ConfigStore, config: &Config) -> Result<()> {
    if settings.get_config().is_some() {
        return Ok(());
    }
    if config.auth.keycloak.is_none() && config.auth.entra.is_none() {
        return Ok(());
    }

    let seeded = StoredSettings {
        current_provider: config.auth.provider.unwrap_or_else(|| {
            if config.auth.keycloak.is_none() {
                crate::auth::ProviderKind::Entra
            } else {
                crate::auth::ProviderKind::Keycloak
            }
        }),
        keycloak: config.auth.keycloak.clone(),
        entra: config.auth.entra.clone(),
        api: config.api.clone(),
    };
    tracing::info!(
        provider = %seeded.current_provider,
        "Seeding stored settings from configuration file"
    );
    settings.save_config(&seeded)
}

/// Renders an optional value, or a dimmed placeholder.
pub(crate) fn or_dash(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::KeycloakConfig;
    use crate::auth::ProviderKind;
    use crate::storage::MemoryStore;

    #[test]
    fn test_seed_settings_from_config_file() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.auth.keycloak = Some(KeycloakConfig {
            issuer: "https://kc/realms/x".to_string(),
            client_id: "c1".to_string(),
            ..Default::default()
        });

        let ctx = AppContext::with_store(config, store).unwrap();
        let stored = ctx.controller.settings().get_config().unwrap();
        assert_eq!(stored.current_provider, ProviderKind::Keycloak);
        assert!(ctx.controller.settings().has_oauth_config());
    }

    #[test]
    fn test_seed_settings_keeps_existing_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let settings = ConfigStore::new(store.clone());
        settings.set_current_provider(ProviderKind::Entra).unwrap();

        let mut config = Config::default();
        config.auth.keycloak = Some(KeycloakConfig {
            issuer: "https://kc/realms/x".to_string(),
            client_id: "c1".to_string(),
            ..Default::default()
        });
        seed_settings(&settings, &config).unwrap();

        let stored = settings.get_config().unwrap();
        assert_eq!(stored.current_provider, ProviderKind::Entra);
        assert!(stored.keycloak.is_none());
    }

    #[test]
    fn test_api_config_falls_back_to_config_file() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.api.base_url = "http://api.local".to_string();
        let ctx = AppContext::with_store(config, store).unwrap();
        assert_eq!(ctx.api_config().base_url, "http://api.local");
    }
}
