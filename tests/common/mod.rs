use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use tempfile::TempDir;
use url::Url;

use tokenprobe::auth::client::{CodeExchange, OidcClient, TokenResponse};
use tokenprobe::auth::discovery::{DiscoveryDocument, ProviderEndpoints};
use tokenprobe::auth::manual_exchange::ManualTokenExchange;
use tokenprobe::auth::provider::{KeycloakConfig, NormalizedAuthParams, ProviderConfig};
use tokenprobe::auth::{AuthController, MemoryNavigator, StandardOidcClient};
use tokenprobe::error::Result;
use tokenprobe::storage::{KeyValueStore, MemoryStore};

#[allow(dead_code)]
pub const ORIGIN: &str = "http://localhost:4200/";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Unsigned compact JWT with the given payload.
#[allow(dead_code)]
pub fn make_jwt(payload: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.c2lnbmF0dXJl",
        engine.encode(serde_json::json!({"alg": "RS256", "typ": "JWT", "kid": "k1"}).to_string()),
        engine.encode(payload.to_string())
    )
}

/// Keycloak settings whose issuer is `{base}/realms/x`.
#[allow(dead_code)]
pub fn keycloak_config(base: &str) -> ProviderConfig {
    ProviderConfig::Keycloak(KeycloakConfig {
        issuer: format!("{}/realms/x", base),
        client_id: "c1".to_string(),
        ..Default::default()
    })
}

/// Discovery document for a Keycloak realm at `authority`.
#[allow(dead_code)]
pub fn keycloak_discovery(authority: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": authority,
        "authorization_endpoint": format!("{}/protocol/openid-connect/auth", authority),
        "token_endpoint": format!("{}/protocol/openid-connect/token", authority),
        "userinfo_endpoint": format!("{}/protocol/openid-connect/userinfo", authority),
        "end_session_endpoint": format!("{}/protocol/openid-connect/logout", authority),
        "revocation_endpoint": format!("{}/protocol/openid-connect/revoke", authority),
        "code_challenge_methods_supported": ["plain", "S256"]
    })
}

/// OIDC client whose discovery is served locally and whose standard
/// exchange always returns a response without an access token.
#[allow(dead_code)]
#[derive(Default)]
pub struct TokenlessOidcClient {
    pub exchange_calls: AtomicUsize,
    pub last_exchange: Mutex<Option<CodeExchange>>,
}

#[async_trait]
impl OidcClient for TokenlessOidcClient {
    async fn load_discovery_document(
        &self,
        params: &NormalizedAuthParams,
    ) -> Result<DiscoveryDocument> {
        Ok(serde_json::from_value(keycloak_discovery(&params.authority))?)
    }

    async fn exchange_code(
        &self,
        _params: &NormalizedAuthParams,
        _endpoints: &ProviderEndpoints,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_exchange.lock().unwrap() = Some(exchange.clone());
        Ok(TokenResponse {
            token_type: Some("Bearer".to_string()),
            ..Default::default()
        })
    }

    async fn refresh(
        &self,
        _params: &NormalizedAuthParams,
        _endpoints: &ProviderEndpoints,
        _refresh_token: &str,
    ) -> Result<TokenResponse> {
        Ok(TokenResponse::default())
    }

    async fn revoke(
        &self,
        _params: &NormalizedAuthParams,
        _endpoints: &ProviderEndpoints,
        _token: &str,
        _token_type_hint: &str,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// A controller wired to in-memory collaborators.
#[allow(dead_code)]
pub struct Harness {
    pub controller: AuthController,
    pub navigator: Arc<MemoryNavigator>,
    pub store: Arc<MemoryStore>,
}

#[allow(dead_code)]
pub fn harness_with(oidc: Arc<dyn OidcClient>, current_url: &str) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new(
        Url::parse(current_url).expect("valid current URL"),
    ));
    let http = Arc::new(reqwest::Client::new());
    let controller = AuthController::new(
        oidc,
        ManualTokenExchange::new(http),
        store.clone() as Arc<dyn KeyValueStore>,
        navigator.clone(),
    );
    Harness {
        controller,
        navigator,
        store,
    }
}

/// Harness backed by the real reqwest OIDC client.
#[allow(dead_code)]
pub fn standard_harness(current_url: &str) -> Harness {
    let http = Arc::new(reqwest::Client::new());
    harness_with(Arc::new(StandardOidcClient::new(http)), current_url)
}
