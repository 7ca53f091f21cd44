//! OpenID Connect discovery
//!
//! Fetches and validates the provider's discovery document, and merges it
//! with any explicit endpoint overrides into a [`ProviderEndpoints`] set.
//! Failures are classified (connection refused, not found, timeout, other)
//! so the user sees a provider-specific explanation rather than a raw
//! transport error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::provider::{EndpointOverrides, NormalizedAuthParams, ProviderKind};
use crate::error::{DiscoveryFailureKind, Result, TokenProbeError};

// ---------------------------------------------------------------------------
// DiscoveryDocument
// ---------------------------------------------------------------------------

/// The subset of OIDC provider metadata this client uses.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::discovery::DiscoveryDocument;
///
/// let json = r#"{
///     "issuer": "https://kc.example.com/realms/dev",
///     "authorization_endpoint": "https://kc.example.com/realms/dev/protocol/openid-connect/auth",
///     "token_endpoint": "https://kc.example.com/realms/dev/protocol/openid-connect/token",
///     "grant_types_supported": ["authorization_code"]
/// }"#;
///
/// let doc: DiscoveryDocument = serde_json::from_str(json).unwrap();
/// assert!(doc.end_session_endpoint.is_none());
/// assert!(doc.extra.contains_key("grant_types_supported"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    /// Everything else the provider advertises
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ProviderEndpoints
// ---------------------------------------------------------------------------

/// Endpoints the flow actually talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    pub revocation_endpoint: Option<String>,
    /// `Some(false)` when discovery explicitly lacks S256; `None` without discovery
    pub supports_s256: Option<bool>,
}

impl ProviderEndpoints {
    /// Builds endpoints from overrides alone. Returns `None` unless both the
    /// authorization and token endpoints are set.
    pub fn from_overrides(overrides: &EndpointOverrides) -> Option<Self> {
        Some(Self {
            authorization_endpoint: overrides.authorization_endpoint.clone()?,
            token_endpoint: overrides.token_endpoint.clone()?,
            userinfo_endpoint: overrides.userinfo_endpoint.clone(),
            end_session_endpoint: overrides.logout_endpoint.clone(),
            revocation_endpoint: None,
            supports_s256: None,
        })
    }

    /// Builds endpoints from a discovery document; any override wins over
    /// the discovered value.
    pub fn from_document(document: &DiscoveryDocument, overrides: &EndpointOverrides) -> Self {
        Self {
            authorization_endpoint: overrides
                .authorization_endpoint
                .clone()
                .unwrap_or_else(|| document.authorization_endpoint.clone()),
            token_endpoint: overrides
                .token_endpoint
                .clone()
                .unwrap_or_else(|| document.token_endpoint.clone()),
            userinfo_endpoint: overrides
                .userinfo_endpoint
                .clone()
                .or_else(|| document.userinfo_endpoint.clone()),
            end_session_endpoint: overrides
                .logout_endpoint
                .clone()
                .or_else(|| document.end_session_endpoint.clone()),
            revocation_endpoint: document.revocation_endpoint.clone(),
            supports_s256: Some(crate::auth::pkce::advertises_s256(document)),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetches the discovery document for `params`.
///
/// # Errors
///
/// Returns `TokenProbeError::Discovery` with a classified kind and a
/// provider-specific message.
pub async fn fetch_discovery_document(
    http: &reqwest::Client,
    params: &NormalizedAuthParams,
) -> Result<DiscoveryDocument> {
    let url = params.discovery_url();
    tracing::debug!(url = %url, "Fetching discovery document");

    let resp = match http
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            let kind = if e.is_timeout() {
                DiscoveryFailureKind::Timeout
            } else if e.is_connect() {
                DiscoveryFailureKind::ConnectionRefused
            } else {
                DiscoveryFailureKind::Other
            };
            return Err(discovery_error(params.provider, kind, None, &e.to_string()).into());
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let kind = if status == reqwest::StatusCode::NOT_FOUND {
            DiscoveryFailureKind::NotFound
        } else {
            DiscoveryFailureKind::Other
        };
        let body = resp.text().await.unwrap_or_default();
        let detail = format!("discovery endpoint returned {}: {}", status, body);
        return Err(discovery_error(params.provider, kind, Some(status.as_u16()), &detail).into());
    }

    resp.json::<DiscoveryDocument>().await.map_err(|e| {
        discovery_error(
            params.provider,
            DiscoveryFailureKind::Other,
            Some(status.as_u16()),
            &format!("failed to parse discovery document: {}", e),
        )
        .into()
    })
}

fn discovery_error(
    provider: ProviderKind,
    kind: DiscoveryFailureKind,
    status: Option<u16>,
    detail: &str,
) -> TokenProbeError {
    TokenProbeError::Discovery {
        kind,
        status,
        message: describe_discovery_failure(provider, kind, detail),
    }
}

/// Human-readable explanation for a discovery failure.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::discovery::describe_discovery_failure;
/// use tokenprobe::auth::provider::ProviderKind;
/// use tokenprobe::error::DiscoveryFailureKind;
///
/// let msg = describe_discovery_failure(ProviderKind::Keycloak, DiscoveryFailureKind::NotFound, "404");
/// assert_eq!(msg, "Keycloak realm not found. Please check your issuer URL.");
/// ```
pub fn describe_discovery_failure(
    provider: ProviderKind,
    kind: DiscoveryFailureKind,
    detail: &str,
) -> String {
    match (provider, kind) {
        (ProviderKind::Keycloak, DiscoveryFailureKind::ConnectionRefused) => {
            "Cannot connect to Keycloak server. Please check:\n\
             1. Server is running and accessible\n\
             2. Proxy and TLS settings allow the connection\n\
             3. URL is correct in configuration"
                .to_string()
        }
        (ProviderKind::Entra, DiscoveryFailureKind::ConnectionRefused) => {
            "Cannot connect to Microsoft Entra ID. Please check:\n\
             1. login.microsoftonline.com is reachable\n\
             2. Proxy and TLS settings allow the connection\n\
             3. Authority URL is correct in configuration"
                .to_string()
        }
        (ProviderKind::Keycloak, DiscoveryFailureKind::NotFound) => {
            "Keycloak realm not found. Please check your issuer URL.".to_string()
        }
        (ProviderKind::Entra, DiscoveryFailureKind::NotFound) => {
            "Microsoft Entra ID tenant not found. Please check your tenant ID.".to_string()
        }
        (_, DiscoveryFailureKind::Timeout) => format!(
            "{} did not respond in time: {}",
            provider.display_name(),
            detail
        ),
        (_, DiscoveryFailureKind::Other) => format!("Login failed: {}", detail),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a fetched document against the configured parameters.
///
/// The issuer must match the expected issuer (ignoring a trailing slash)
/// unless `skip_issuer_check` is set.
///
/// # Errors
///
/// Returns `TokenProbeError::DiscoveryValidation` with remediation text
/// specific to the provider.
pub fn validate_discovery_document(
    document: &DiscoveryDocument,
    params: &NormalizedAuthParams,
) -> Result<()> {
    if document.authorization_endpoint.trim().is_empty() || document.token_endpoint.trim().is_empty()
    {
        return Err(TokenProbeError::DiscoveryValidation(format!(
            "{} discovery document is missing the authorization or token endpoint",
            params.provider.display_name()
        ))
        .into());
    }

    if params.skip_issuer_check {
        return Ok(());
    }

    let expected = params.expected_issuer();
    if document.issuer.trim_end_matches('/') != expected.trim_end_matches('/') {
        let remediation = match params.provider {
            ProviderKind::Keycloak => {
                "Check that the issuer URL includes /realms/<name> and matches the \
                 Keycloak frontend URL exactly"
            }
            ProviderKind::Entra => {
                "Entra ID issuers embed the tenant id; enable skip_issuer_check or \
                 configure explicit endpoints"
            }
        };
        return Err(TokenProbeError::DiscoveryValidation(format!(
            "issuer '{}' does not match expected '{}'. {}",
            document.issuer, expected, remediation
        ))
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{resolve, KeycloakConfig, ProviderConfig};
    use url::Url;

    fn keycloak_params() -> NormalizedAuthParams {
        resolve(
            &ProviderConfig::Keycloak(KeycloakConfig {
                issuer: "https://kc/realms/x".to_string(),
                client_id: "c1".to_string(),
                ..Default::default()
            }),
            &Url::parse("http://localhost:4200").unwrap(),
        )
        .unwrap()
    }

    fn document(issuer: &str) -> DiscoveryDocument {
        serde_json::from_value(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": "https://kc/realms/x/protocol/openid-connect/auth",
            "token_endpoint": "https://kc/realms/x/protocol/openid-connect/token",
            "end_session_endpoint": "https://kc/realms/x/protocol/openid-connect/logout",
            "revocation_endpoint": "https://kc/realms/x/protocol/openid-connect/revoke"
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_accepts_matching_issuer_with_trailing_slash() {
        assert!(validate_discovery_document(&document("https://kc/realms/x/"), &keycloak_params()).is_ok());
    }

    #[test]
    fn test_validate_rejects_issuer_mismatch_with_remediation() {
        let err = validate_discovery_document(&document("https://other/realms/y"), &keycloak_params())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("does not match"));
        assert!(msg.contains("/realms/<name>"));
    }

    #[test]
    fn test_validate_skips_issuer_when_requested() {
        let mut params = keycloak_params();
        params.skip_issuer_check = true;
        assert!(validate_discovery_document(&document("https://other"), &params).is_ok());
    }

    #[test]
    fn test_endpoints_from_document_prefer_overrides() {
        let overrides = EndpointOverrides {
            token_endpoint: Some("https://proxy/token".to_string()),
            ..Default::default()
        };
        let endpoints = ProviderEndpoints::from_document(&document("https://kc/realms/x"), &overrides);
        assert_eq!(endpoints.token_endpoint, "https://proxy/token");
        assert_eq!(
            endpoints.revocation_endpoint.as_deref(),
            Some("https://kc/realms/x/protocol/openid-connect/revoke")
        );
        assert_eq!(endpoints.supports_s256, Some(true));
    }

    #[test]
    fn test_endpoints_from_incomplete_overrides_is_none() {
        let overrides = EndpointOverrides {
            authorization_endpoint: Some("https://a".to_string()),
            ..Default::default()
        };
        assert!(ProviderEndpoints::from_overrides(&overrides).is_none());
    }

    #[test]
    fn test_failure_messages_are_provider_specific() {
        let refused = describe_discovery_failure(
            ProviderKind::Keycloak,
            DiscoveryFailureKind::ConnectionRefused,
            "",
        );
        assert!(refused.starts_with("Cannot connect to Keycloak server"));

        let entra_missing =
            describe_discovery_failure(ProviderKind::Entra, DiscoveryFailureKind::NotFound, "");
        assert!(entra_missing.contains("tenant not found"));

        let other =
            describe_discovery_failure(ProviderKind::Keycloak, DiscoveryFailureKind::Other, "HTTP 500");
        assert_eq!(other, "Login failed: HTTP 500");
    }
}
