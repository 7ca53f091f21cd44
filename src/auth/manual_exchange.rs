//! Direct authorization-code exchange used when the standard path yields no
//! usable access token
//!
//! The request is built by hand: a form-encoded body with
//! `grant_type=authorization_code`, `code`, `redirect_uri` and `client_id`
//! (plus `code_verifier` when PKCE was used), sent with explicit
//! `Content-Type` and `Accept` headers. There is no automatic retry.
//!
//! Only Keycloak is wired. For other providers [`ManualTokenExchange::exchange`]
//! returns [`TokenProbeError::ManualExchangeUnavailable`] instead of silently
//! doing nothing.

use std::sync::Arc;

use crate::auth::client::TokenResponse;
use crate::auth::provider::{NormalizedAuthParams, ProviderKind};
use crate::auth::session::TokenSet;
use crate::error::{Result, TokenProbeError};

/// Form-encoded content type for token requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request inputs that must match the original authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualExchangeRequest<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub code_verifier: Option<&'a str>,
}

/// Builds the urlencoded request body.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::manual_exchange::{build_form_body, ManualExchangeRequest};
///
/// let body = build_form_body(&ManualExchangeRequest {
///     code: "ABC",
///     redirect_uri: "http://localhost:4200/auth",
///     client_id: "c1",
///     code_verifier: None,
/// });
/// assert_eq!(
///     body,
///     "grant_type=authorization_code&code=ABC&redirect_uri=http%3A%2F%2Flocalhost%3A4200%2Fauth&client_id=c1"
/// );
/// ```
pub fn build_form_body(request: &ManualExchangeRequest<'_>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("grant_type", "authorization_code");
    serializer.append_pair("code", request.code);
    serializer.append_pair("redirect_uri", request.redirect_uri);
    serializer.append_pair("client_id", request.client_id);
    if let Some(verifier) = request.code_verifier {
        serializer.append_pair("code_verifier", verifier);
    }
    serializer.finish()
}

/// Performs the fallback exchange.
pub struct ManualTokenExchange {
    http: Arc<reqwest::Client>,
}

impl ManualTokenExchange {
    pub fn new(http: Arc<reqwest::Client>) -> Self {
        Self { http }
    }

    /// Whether the fallback is wired for `provider`.
    pub fn supports(provider: ProviderKind) -> bool {
        matches!(provider, ProviderKind::Keycloak)
    }

    /// Exchanges `request.code` at `token_endpoint`.
    ///
    /// # Errors
    ///
    /// - `TokenProbeError::ManualExchangeUnavailable` when the provider is
    ///   not supported; no request is sent.
    /// - `TokenProbeError::Exchange` on transport failure, a non-2xx status,
    ///   an unparsable body or a response without `access_token`. The
    ///   message carries the upstream error.
    pub async fn exchange(
        &self,
        params: &NormalizedAuthParams,
        token_endpoint: &str,
        request: &ManualExchangeRequest<'_>,
    ) -> Result<TokenSet> {
        if !Self::supports(params.provider) {
            return Err(TokenProbeError::ManualExchangeUnavailable(
                params.provider.display_name().to_string(),
            )
            .into());
        }

        tracing::info!(
            token_endpoint,
            client_id = request.client_id,
            redirect_uri = request.redirect_uri,
            "Sending manual token exchange request"
        );

        let resp = self
            .http
            .post(token_endpoint)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(build_form_body(request))
            .send()
            .await
            .map_err(|e| TokenProbeError::Exchange(format!("Manual token exchange failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenProbeError::Exchange(format!(
                "Manual token exchange failed: token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let response: TokenResponse = resp.json().await.map_err(|e| {
            TokenProbeError::Exchange(format!(
                "Manual token exchange failed: invalid token response: {e}"
            ))
        })?;

        response.into_token_set().ok_or_else(|| {
            TokenProbeError::Exchange(
                "Manual token exchange failed: response has no access_token".to_string(),
            )
            .into()
        })
    }
}
