//! Persisted provider and API settings
//!
//! Both provider configurations live side by side in one JSON document so
//! switching the current provider never discards the other one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::ApiConfig;
use crate::auth::provider::{
    is_usable, EntraConfig, KeycloakConfig, ProviderConfig, ProviderKind, ENTRA_DEFAULT_SCOPE,
    KEYCLOAK_DEFAULT_SCOPE,
};
use crate::error::Result;
use crate::storage::{load_json, save_json, KeyValueStore};

/// Storage slot holding [`StoredSettings`].
pub const SETTINGS_KEY: &str = "tokenprobe-config";

/// Text shown for unset values.
pub const NOT_SET: &str = "(not set)";

/// Everything the user has configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub current_provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak: Option<KeycloakConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entra: Option<EntraConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

impl StoredSettings {
    /// Settings for the current provider, if any were saved.
    pub fn current(&self) -> Option<ProviderConfig> {
        self.provider(self.current_provider)
    }

    /// Settings for `kind`, if saved.
    pub fn provider(&self, kind: ProviderKind) -> Option<ProviderConfig> {
        match kind {
            ProviderKind::Keycloak => self.keycloak.clone().map(ProviderConfig::Keycloak),
            ProviderKind::Entra => self.entra.clone().map(ProviderConfig::Entra),
        }
    }

    /// Issuer or authority of the current provider, or `(not set)`.
    pub fn auth_server_display(&self) -> String {
        self.current()
            .and_then(|c| c.auth_server_url())
            .unwrap_or_else(|| NOT_SET.to_string())
    }

    /// Client id of the current provider, or `(not set)`.
    pub fn client_id_display(&self) -> String {
        self.current()
            .map(|c| c.client_id().trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| NOT_SET.to_string())
    }
}

/// Starter Keycloak settings, shown when nothing was configured yet.
pub fn default_keycloak_config() -> KeycloakConfig {
    KeycloakConfig {
        issuer: String::new(),
        client_id: String::new(),
        redirect_uri: None,
        scope: Some(KEYCLOAK_DEFAULT_SCOPE.to_string()),
        use_pkce: None,
    }
}

/// Starter Entra settings.
pub fn default_entra_config() -> EntraConfig {
    EntraConfig {
        scope: Some(ENTRA_DEFAULT_SCOPE.to_string()),
        ..Default::default()
    }
}

/// Read/write access to [`StoredSettings`] in a [`KeyValueStore`].
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Saved settings, or `None` when nothing (readable) was stored.
    pub fn get_config(&self) -> Option<StoredSettings> {
        load_json(self.store.as_ref(), SETTINGS_KEY)
    }

    /// Saved settings, or defaults.
    pub fn get_or_default(&self) -> StoredSettings {
        self.get_config().unwrap_or_default()
    }

    pub fn save_config(&self, settings: &StoredSettings) -> Result<()> {
        save_json(self.store.as_ref(), SETTINGS_KEY, settings)
    }

    pub fn current_provider(&self) -> ProviderKind {
        self.get_or_default().current_provider
    }

    /// Settings for the current provider.
    pub fn current_provider_config(&self) -> Option<ProviderConfig> {
        self.get_config()?.current()
    }

    pub fn save_keycloak_config(&self, config: KeycloakConfig) -> Result<()> {
        let mut settings = self.get_or_default();
        settings.keycloak = Some(config);
        self.save_config(&settings)
    }

    pub fn save_entra_config(&self, config: EntraConfig) -> Result<()> {
        let mut settings = self.get_or_default();
        settings.entra = Some(config);
        self.save_config(&settings)
    }

    pub fn save_api_config(&self, config: ApiConfig) -> Result<()> {
        let mut settings = self.get_or_default();
        settings.api = config;
        self.save_config(&settings)
    }

    /// Stores `config` and makes its provider current.
    pub fn save_provider_config(&self, config: &ProviderConfig) -> Result<()> {
        let mut settings = self.get_or_default();
        settings.current_provider = config.kind();
        match config {
            ProviderConfig::Keycloak(c) => settings.keycloak = Some(c.clone()),
            ProviderConfig::Entra(c) => settings.entra = Some(c.clone()),
        }
        self.save_config(&settings)
    }

    /// Switches the current provider without touching either provider's settings.
    pub fn set_current_provider(&self, kind: ProviderKind) -> Result<()> {
        let mut settings = self.get_or_default();
        settings.current_provider = kind;
        self.save_config(&settings)
    }

    pub fn clear_config(&self) -> Result<()> {
        self.store.remove(SETTINGS_KEY)
    }

    /// True when the current provider's settings are usable for a login.
    pub fn has_oauth_config(&self) -> bool {
        self.current_provider_config()
            .map(|c| is_usable(&c))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn config_store() -> ConfigStore {
        ConfigStore::new(Arc::new(MemoryStore::new()))
    }

    fn keycloak() -> KeycloakConfig {
        KeycloakConfig {
            issuer: "https://kc/realms/x".to_string(),
            client_id: "c1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_has_no_config() {
        let store = config_store();
        assert!(store.get_config().is_none());
        assert!(!store.has_oauth_config());
        assert_eq!(store.current_provider(), ProviderKind::Keycloak);
    }

    #[test]
    fn test_switching_provider_keeps_both_configs() {
        let store = config_store();
        store.save_keycloak_config(keycloak()).unwrap();
        store
            .save_entra_config(EntraConfig {
                tenant_id: "t".to_string(),
                client_id: "e1".to_string(),
                ..Default::default()
            })
            .unwrap();

        store.set_current_provider(ProviderKind::Entra).unwrap();
        let settings = store.get_config().unwrap();
        assert_eq!(settings.current_provider, ProviderKind::Entra);
        assert!(settings.keycloak.is_some());
        assert_eq!(settings.client_id_display(), "e1");
        assert_eq!(
            settings.auth_server_display(),
            "https://login.microsoftonline.com/t"
        );

        store.set_current_provider(ProviderKind::Keycloak).unwrap();
        assert_eq!(store.current_provider_config(), Some(ProviderConfig::Keycloak(keycloak())));
    }

    #[test]
    fn test_has_oauth_config_follows_current_provider() {
        let store = config_store();
        store.save_keycloak_config(keycloak()).unwrap();
        assert!(store.has_oauth_config());

        store.set_current_provider(ProviderKind::Entra).unwrap();
        assert!(!store.has_oauth_config());
    }

    #[test]
    fn test_display_helpers_without_settings() {
        let settings = StoredSettings::default();
        assert_eq!(settings.auth_server_display(), NOT_SET);
        assert_eq!(settings.client_id_display(), NOT_SET);
    }

    #[test]
    fn test_save_provider_config_makes_it_current() {
        let store = config_store();
        store
            .save_provider_config(&ProviderConfig::Entra(EntraConfig {
                tenant_id: "t".to_string(),
                client_id: "e1".to_string(),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(store.current_provider(), ProviderKind::Entra);
        assert!(store.has_oauth_config());
    }

    #[test]
    fn test_clear_config() {
        let store = config_store();
        store.save_keycloak_config(keycloak()).unwrap();
        store.clear_config().unwrap();
        assert!(store.get_config().is_none());
    }

    #[test]
    fn test_default_configs_carry_scopes() {
        assert_eq!(
            default_keycloak_config().scope.as_deref(),
            Some(KEYCLOAK_DEFAULT_SCOPE)
        );
        assert_eq!(default_entra_config().scope.as_deref(), Some(ENTRA_DEFAULT_SCOPE));
        assert_eq!(ApiConfig::default().base_url, "http://localhost:8810");
    }
}
