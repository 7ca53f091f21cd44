//! The OIDC client seam
//!
//! [`OidcClient`] is what the flow controller calls for discovery, the
//! standard code exchange, refresh and revocation. [`StandardOidcClient`]
//! implements it over `reqwest`. The controller does not take a successful
//! return at face value; it re-checks that a usable access token exists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::auth::discovery::{
    fetch_discovery_document, validate_discovery_document, DiscoveryDocument, ProviderEndpoints,
};
use crate::auth::jwt;
use crate::auth::provider::NormalizedAuthParams;
use crate::auth::session::TokenSet;
use crate::error::{Result, TokenProbeError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Token endpoint response (RFC 6749 section 5.1).
///
/// Every field is optional so a malformed success response still
/// deserializes and the caller can decide what "usable" means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Converts into a [`TokenSet`]. Returns `None` without an access token.
    pub fn into_token_set(self) -> Option<TokenSet> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        Some(TokenSet::from_response_parts(
            access_token,
            self.refresh_token,
            self.id_token,
            self.expires_in,
            self.scope,
            Utc::now(),
        ))
    }
}

/// Inputs for an authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExchange {
    pub code: String,
    /// Must match the redirect URI of the authorization request exactly
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
    /// Expected `nonce` claim in the returned ID token
    pub nonce: Option<String>,
}

// ---------------------------------------------------------------------------
// OidcClient
// ---------------------------------------------------------------------------

/// Protocol operations the flow controller delegates.
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Fetches and validates the discovery document.
    async fn load_discovery_document(
        &self,
        params: &NormalizedAuthParams,
    ) -> Result<DiscoveryDocument>;

    /// Exchanges an authorization code at the token endpoint.
    async fn exchange_code(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse>;

    /// Uses a refresh token to obtain new tokens.
    async fn refresh(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        refresh_token: &str,
    ) -> Result<TokenResponse>;

    /// Revokes `token`. Returns `Ok(false)` when the provider has no
    /// revocation endpoint.
    async fn revoke(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        token: &str,
        token_type_hint: &str,
    ) -> Result<bool>;
}

/// `reqwest`-backed [`OidcClient`].
pub struct StandardOidcClient {
    http: Arc<reqwest::Client>,
}

impl StandardOidcClient {
    pub fn new(http: Arc<reqwest::Client>) -> Self {
        Self { http }
    }

    async fn post_token_request(
        &self,
        token_endpoint: &str,
        form: &HashMap<&str, &str>,
    ) -> Result<TokenResponse> {
        let resp = self
            .http
            .post(token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| TokenProbeError::Exchange(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenProbeError::Exchange(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| TokenProbeError::Exchange(format!("failed to parse token response: {e}")).into())
    }
}

#[async_trait]
impl OidcClient for StandardOidcClient {
    async fn load_discovery_document(
        &self,
        params: &NormalizedAuthParams,
    ) -> Result<DiscoveryDocument> {
        let document = fetch_discovery_document(&self.http, params).await?;
        validate_discovery_document(&document, params)?;
        Ok(document)
    }

    async fn exchange_code(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse> {
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", &exchange.code);
        form.insert("redirect_uri", &exchange.redirect_uri);
        form.insert("client_id", &params.client_id);
        if let Some(verifier) = exchange.code_verifier.as_deref() {
            form.insert("code_verifier", verifier);
        }

        let response = self
            .post_token_request(&endpoints.token_endpoint, &form)
            .await?;

        if let Some(id_token) = response.id_token.as_deref() {
            verify_id_token(
                id_token,
                exchange.nonce.as_deref(),
                response.access_token.as_deref(),
                params.disable_at_hash_check,
            )?;
        }

        Ok(response)
    }

    async fn refresh(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", &params.client_id);
        form.insert("scope", &params.scope);

        self.post_token_request(&endpoints.token_endpoint, &form)
            .await
            .map_err(|e| TokenProbeError::Refresh(e.to_string()).into())
    }

    async fn revoke(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        token: &str,
        token_type_hint: &str,
    ) -> Result<bool> {
        let Some(revocation_endpoint) = endpoints.revocation_endpoint.as_deref() else {
            return Ok(false);
        };

        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("token", token);
        form.insert("token_type_hint", token_type_hint);
        form.insert("client_id", &params.client_id);

        let resp = self
            .http
            .post(revocation_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenProbeError::Exchange(format!("revocation request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenProbeError::HttpStatus { status, body }.into());
        }

        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ID token checks
// ---------------------------------------------------------------------------

/// Checks the ID token's `nonce` and, unless disabled, its `at_hash`.
///
/// Signatures are not verified; these checks only catch mix-ups between
/// requests and responses.
fn verify_id_token(
    id_token: &str,
    expected_nonce: Option<&str>,
    access_token: Option<&str>,
    disable_at_hash_check: bool,
) -> Result<()> {
    let Some(decoded) = jwt::decode(id_token) else {
        tracing::warn!("ID token could not be decoded; skipping nonce and at_hash checks");
        return Ok(());
    };

    if let Some(expected) = expected_nonce {
        if decoded.claim_str("nonce") != Some(expected) {
            return Err(TokenProbeError::Exchange("ID token nonce mismatch".to_string()).into());
        }
    }

    if disable_at_hash_check {
        return Ok(());
    }

    if let (Some(at_hash), Some(access_token)) = (decoded.claim_str("at_hash"), access_token) {
        let expected = compute_at_hash(access_token, decoded.header.alg.as_deref());
        if at_hash != expected {
            return Err(TokenProbeError::Exchange("ID token at_hash mismatch".to_string()).into());
        }
    }

    Ok(())
}

/// Left half of the access token hash, base64url without padding
/// (OIDC Core section 3.1.3.6). The hash follows the ID token's `alg`.
pub fn compute_at_hash(access_token: &str, alg: Option<&str>) -> String {
    let digest: Vec<u8> = match alg.unwrap_or("RS256") {
        a if a.ends_with("384") => Sha384::digest(access_token.as_bytes()).to_vec(),
        a if a.ends_with("512") => Sha512::digest(access_token.as_bytes()).to_vec(),
        _ => Sha256::digest(access_token.as_bytes()).to_vec(),
    };
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id_token(payload: serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            engine.encode(json!({"alg": "RS256"}).to_string()),
            engine.encode(payload.to_string())
        )
    }

    #[test]
    fn test_token_response_without_access_token_has_no_token_set() {
        let response: TokenResponse = serde_json::from_str(r#"{"token_type":"Bearer"}"#).unwrap();
        assert!(response.into_token_set().is_none());
    }

    #[test]
    fn test_token_response_into_token_set() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "T",
            "token_type": "bearer",
            "expires_in": 300,
            "refresh_token": "R"
        }))
        .unwrap();
        let tokens = response.into_token_set().unwrap();
        assert_eq!(tokens.access_token, "T");
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R"));
        assert!(tokens.expires_at.is_some());
    }

    #[test]
    fn test_nonce_mismatch_is_rejected() {
        let token = id_token(json!({"nonce": "n-1"}));
        assert!(verify_id_token(&token, Some("n-1"), None, true).is_ok());
        assert!(verify_id_token(&token, Some("n-2"), None, true).is_err());
    }

    #[test]
    fn test_at_hash_check_can_be_disabled() {
        let token = id_token(json!({"at_hash": "wrong"}));
        assert!(verify_id_token(&token, None, Some("access"), false).is_err());
        assert!(verify_id_token(&token, None, Some("access"), true).is_ok());

        let good = id_token(json!({"at_hash": compute_at_hash("access", Some("RS256"))}));
        assert!(verify_id_token(&good, None, Some("access"), false).is_ok());
    }

    #[test]
    fn test_at_hash_is_half_digest_length() {
        // 16 bytes of SHA-256 -> 22 base64url characters
        assert_eq!(compute_at_hash("token", None).len(), 22);
        // 32 bytes of SHA-512 -> 43 characters
        assert_eq!(compute_at_hash("token", Some("RS512")).len(), 43);
    }
}
