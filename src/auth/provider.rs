//! Provider configuration and resolution into normalized OAuth parameters
//!
//! Keycloak and Microsoft Entra ID are modelled as a tagged union,
//! [`ProviderConfig`]. The flow controller never branches on the provider
//! itself; it consumes the [`NormalizedAuthParams`] produced by [`resolve`].
//!
//! Defaults differ per provider:
//!
//! | | Keycloak | Entra ID |
//! |---|---|---|
//! | authority | `issuer` as given | `https://login.microsoftonline.com/{tenant}` |
//! | PKCE | off | on |
//! | scope | `openid profile email` | `openid profile email offline_access` |
//! | endpoints | discovery | built-in v2.0 endpoints, discovery opt-in |
//!
//! Keycloak PKCE is off because typical Keycloak public clients are set up
//! without it, even though Keycloak itself recommends enabling it. Set
//! `use_pkce: true` on the Keycloak config to opt in.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TokenProbeError};

/// Base URL of the Microsoft identity platform.
pub const ENTRA_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Microsoft Graph OIDC userinfo endpoint.
pub const ENTRA_USERINFO_ENDPOINT: &str = "https://graph.microsoft.com/oidc/userinfo";

/// Callback path appended to the origin when no redirect URI is configured.
pub const DEFAULT_CALLBACK_PATH: &str = "/auth";

pub const KEYCLOAK_DEFAULT_SCOPE: &str = "openid profile email";
pub const ENTRA_DEFAULT_SCOPE: &str = "openid profile email offline_access";

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// Supported authorization servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Keycloak,
    Entra,
}

impl ProviderKind {
    /// Lowercase selector used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Keycloak => "keycloak",
            ProviderKind::Entra => "entra",
        }
    }

    /// Name shown to users.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Keycloak => "Keycloak",
            ProviderKind::Entra => "Microsoft Entra ID",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = TokenProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keycloak" => Ok(ProviderKind::Keycloak),
            "entra" | "entra-id" | "azure" => Ok(ProviderKind::Entra),
            other => Err(TokenProbeError::Config(format!(
                "Unknown provider '{}'. Must be one of: keycloak, entra",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-provider settings
// ---------------------------------------------------------------------------

/// Explicit endpoint URLs that bypass the discovery document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_endpoint: Option<String>,
}

impl EndpointOverrides {
    /// True when the overrides alone are enough to run the code flow.
    pub fn is_complete(&self) -> bool {
        self.authorization_endpoint.is_some() && self.token_endpoint.is_some()
    }

    /// Fills every unset field from `defaults`.
    fn or(self, defaults: EndpointOverrides) -> EndpointOverrides {
        EndpointOverrides {
            authorization_endpoint: self
                .authorization_endpoint
                .or(defaults.authorization_endpoint),
            token_endpoint: self.token_endpoint.or(defaults.token_endpoint),
            userinfo_endpoint: self.userinfo_endpoint.or(defaults.userinfo_endpoint),
            logout_endpoint: self.logout_endpoint.or(defaults.logout_endpoint),
        }
    }
}

/// Keycloak realm client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Realm URL, e.g. `https://kc.example.com/realms/dev`
    pub issuer: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Defaults to `false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_pkce: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Microsoft Entra ID app registration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntraConfig {
    pub tenant_id: String,
    pub client_id: String,
    /// Overrides `https://login.microsoftonline.com/{tenant_id}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Defaults to `true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_pkce: Option<bool>,
    /// Explicit endpoints; unset ones fall back to the v2.0 defaults
    #[serde(default)]
    pub endpoints: EndpointOverrides,
    /// Load the discovery document instead of the built-in v2.0 endpoints
    #[serde(default)]
    pub use_discovery: bool,
    #[serde(default = "default_true")]
    pub skip_issuer_check: bool,
    #[serde(default = "default_true")]
    pub disable_at_hash_check: bool,
    #[serde(default = "default_true")]
    pub force_query_response_mode: bool,
}

impl Default for EntraConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            authority: None,
            redirect_uri: None,
            scope: None,
            use_pkce: None,
            endpoints: EndpointOverrides::default(),
            use_discovery: false,
            skip_issuer_check: true,
            disable_at_hash_check: true,
            force_query_response_mode: true,
        }
    }
}

impl EntraConfig {
    /// Configured authority, or the public-cloud authority for the tenant.
    pub fn effective_authority(&self) -> Option<String> {
        if let Some(authority) = self.authority.as_deref().filter(|a| !a.trim().is_empty()) {
            return Some(authority.trim_end_matches('/').to_string());
        }
        let tenant = self.tenant_id.trim();
        if tenant.is_empty() {
            None
        } else {
            Some(format!("{}/{}", ENTRA_LOGIN_BASE, tenant))
        }
    }
}

/// Settings for exactly one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Keycloak(KeycloakConfig),
    Entra(EntraConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Keycloak(_) => ProviderKind::Keycloak,
            ProviderConfig::Entra(_) => ProviderKind::Entra,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            ProviderConfig::Keycloak(c) => &c.client_id,
            ProviderConfig::Entra(c) => &c.client_id,
        }
    }

    /// Issuer (Keycloak) or effective authority (Entra), if known.
    pub fn auth_server_url(&self) -> Option<String> {
        match self {
            ProviderConfig::Keycloak(c) => {
                let issuer = c.issuer.trim();
                (!issuer.is_empty()).then(|| issuer.to_string())
            }
            ProviderConfig::Entra(c) => c.effective_authority(),
        }
    }
}

// ---------------------------------------------------------------------------
// Usability
// ---------------------------------------------------------------------------

fn is_placeholder(value: &str) -> bool {
    value.contains('<') || value.contains('>')
}

/// Returns true when `config` has enough real values to start a login.
///
/// A client id must be present and must not look like a template
/// placeholder (`<client-id>`). Keycloak needs an issuer; Entra needs a
/// tenant id or an explicit authority.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::provider::{is_usable, KeycloakConfig, ProviderConfig};
///
/// let ready = ProviderConfig::Keycloak(KeycloakConfig {
///     issuer: "https://kc/realms/x".to_string(),
///     client_id: "c1".to_string(),
///     ..Default::default()
/// });
/// assert!(is_usable(&ready));
///
/// let template = ProviderConfig::Keycloak(KeycloakConfig {
///     issuer: "https://kc/realms/x".to_string(),
///     client_id: "<your-client-id>".to_string(),
///     ..Default::default()
/// });
/// assert!(!is_usable(&template));
/// ```
pub fn is_usable(config: &ProviderConfig) -> bool {
    let client_id = config.client_id().trim();
    if client_id.is_empty() || is_placeholder(client_id) {
        return false;
    }

    match config {
        ProviderConfig::Keycloak(c) => !c.issuer.trim().is_empty(),
        ProviderConfig::Entra(c) => {
            let has_tenant = !c.tenant_id.trim().is_empty() && !is_placeholder(&c.tenant_id);
            let has_authority = c
                .authority
                .as_deref()
                .map(|a| !a.trim().is_empty())
                .unwrap_or(false);
            has_tenant || has_authority
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Provider-agnostic parameter set consumed by the flow controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAuthParams {
    pub provider: ProviderKind,
    /// Issuer / authority, without a trailing slash
    pub authority: String,
    pub client_id: String,
    /// Sent verbatim on both the authorization and token requests
    pub redirect_uri: String,
    pub scope: String,
    pub use_pkce: bool,
    pub endpoints: EndpointOverrides,
    pub skip_issuer_check: bool,
    pub disable_at_hash_check: bool,
    /// `Some("query")` when the provider must answer in the query string
    pub response_mode: Option<String>,
}

impl NormalizedAuthParams {
    /// URL of the OIDC discovery document.
    pub fn discovery_url(&self) -> String {
        match self.provider {
            ProviderKind::Keycloak => {
                format!("{}/.well-known/openid-configuration", self.authority)
            }
            ProviderKind::Entra => {
                format!("{}/v2.0/.well-known/openid-configuration", self.authority)
            }
        }
    }

    /// Issuer value the discovery document is expected to advertise.
    pub fn expected_issuer(&self) -> String {
        match self.provider {
            ProviderKind::Keycloak => self.authority.clone(),
            ProviderKind::Entra => format!("{}/v2.0", self.authority),
        }
    }

    /// True when discovery can be skipped entirely.
    pub fn bypasses_discovery(&self) -> bool {
        self.endpoints.is_complete()
    }

    /// Token endpoint used when discovery has not been loaded.
    pub fn fallback_token_endpoint(&self) -> String {
        match self.provider {
            ProviderKind::Keycloak => format!("{}/protocol/openid-connect/token", self.authority),
            ProviderKind::Entra => format!("{}/oauth2/v2.0/token", self.authority),
        }
    }
}

fn default_redirect_uri(origin: &Url) -> String {
    format!(
        "{}{}",
        origin.as_str().trim_end_matches('/'),
        DEFAULT_CALLBACK_PATH
    )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves stored settings into [`NormalizedAuthParams`].
///
/// `origin` is the application origin used to build the default redirect
/// URI (`{origin}/auth`).
///
/// # Errors
///
/// Returns `TokenProbeError::Config` when the settings fail [`is_usable`].
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tokenprobe::auth::provider::{resolve, EntraConfig, ProviderConfig};
///
/// let config = ProviderConfig::Entra(EntraConfig {
///     tenant_id: "contoso".to_string(),
///     client_id: "app".to_string(),
///     ..Default::default()
/// });
/// let params = resolve(&config, &Url::parse("http://localhost:4200").unwrap()).unwrap();
///
/// assert_eq!(params.authority, "https://login.microsoftonline.com/contoso");
/// assert_eq!(params.redirect_uri, "http://localhost:4200/auth");
/// assert!(params.use_pkce);
/// assert_eq!(params.response_mode.as_deref(), Some("query"));
/// ```
pub fn resolve(config: &ProviderConfig, origin: &Url) -> Result<NormalizedAuthParams> {
    if !is_usable(config) {
        let kind = config.kind();
        let required = match kind {
            ProviderKind::Keycloak => "issuer and client id",
            ProviderKind::Entra => "tenant id and client id",
        };
        return Err(TokenProbeError::Config(format!(
            "{} configuration is incomplete: {} are required and must not be placeholders",
            kind.display_name(),
            required
        ))
        .into());
    }

    let params = match config {
        ProviderConfig::Keycloak(c) => NormalizedAuthParams {
            provider: ProviderKind::Keycloak,
            authority: c.issuer.trim().trim_end_matches('/').to_string(),
            client_id: c.client_id.trim().to_string(),
            redirect_uri: non_empty(c.redirect_uri.as_deref())
                .unwrap_or_else(|| default_redirect_uri(origin)),
            scope: non_empty(c.scope.as_deref())
                .unwrap_or_else(|| KEYCLOAK_DEFAULT_SCOPE.to_string()),
            use_pkce: c.use_pkce.unwrap_or(false),
            endpoints: EndpointOverrides::default(),
            skip_issuer_check: false,
            disable_at_hash_check: false,
            response_mode: None,
        },
        ProviderConfig::Entra(c) => {
            let authority = c.effective_authority().ok_or_else(|| {
                TokenProbeError::Config("Microsoft Entra ID authority is missing".to_string())
            })?;

            let endpoints = if c.use_discovery {
                c.endpoints.clone()
            } else {
                c.endpoints.clone().or(entra_default_endpoints(&authority))
            };

            NormalizedAuthParams {
                provider: ProviderKind::Entra,
                authority,
                client_id: c.client_id.trim().to_string(),
                redirect_uri: non_empty(c.redirect_uri.as_deref())
                    .unwrap_or_else(|| default_redirect_uri(origin)),
                scope: non_empty(c.scope.as_deref())
                    .unwrap_or_else(|| ENTRA_DEFAULT_SCOPE.to_string()),
                use_pkce: c.use_pkce.unwrap_or(true),
                endpoints,
                skip_issuer_check: c.skip_issuer_check,
                disable_at_hash_check: c.disable_at_hash_check,
                response_mode: c.force_query_response_mode.then(|| "query".to_string()),
            }
        }
    };

    tracing::debug!(
        provider = %params.provider,
        authority = %params.authority,
        redirect_uri = %params.redirect_uri,
        use_pkce = params.use_pkce,
        "Resolved provider configuration"
    );

    Ok(params)
}

fn entra_default_endpoints(authority: &str) -> EndpointOverrides {
    EndpointOverrides {
        authorization_endpoint: Some(format!("{}/oauth2/v2.0/authorize", authority)),
        token_endpoint: Some(format!("{}/oauth2/v2.0/token", authority)),
        userinfo_endpoint: Some(ENTRA_USERINFO_ENDPOINT.to_string()),
        logout_endpoint: Some(format!("{}/oauth2/v2.0/logout", authority)),
    }
}
