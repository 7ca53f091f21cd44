//! Downstream API test client
//!
//! Sends requests to an arbitrary API with the current access token attached
//! as a bearer token, so a developer can check what the API accepts. Transport
//! failures are reported as a response with status 0 instead of an error so
//! the caller can render them like any other outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TokenProbeError};

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8810";

/// HTTP methods offered by the API tester.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body is sent.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = TokenProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(TokenProbeError::Config(format!(
                "Unsupported HTTP method: {}. Must be one of: GET, POST, PUT, DELETE",
                other
            ))),
        }
    }
}

/// Base URL and named endpoints of the API under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_endpoints() -> BTreeMap<String, String> {
    BTreeMap::from([("Test Endpoint".to_string(), "/web/test".to_string())])
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: default_endpoints(),
        }
    }
}

impl ApiConfig {
    /// Full URL of the named endpoint, if configured.
    pub fn endpoint_url(&self, name: &str) -> Option<String> {
        self.endpoints
            .get(name)
            .map(|path| build_url(&self.base_url, path))
    }
}

/// Joins a base URL and an endpoint path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use tokenprobe::api::build_url;
///
/// assert_eq!(build_url("http://localhost:8810/", "/web/test"), "http://localhost:8810/web/test");
/// assert_eq!(build_url("http://localhost:8810", "web/test"), "http://localhost:8810/web/test");
/// ```
pub fn build_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// A request to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
    /// Overrides the default `Content-Type` and `Authorization` headers when
    /// the same name is given
    pub headers: BTreeMap<String, String>,
}

/// Outcome of a request. `status` is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    /// Parsed JSON when the body is JSON, otherwise the raw text as a string
    pub body: Value,
    pub headers: BTreeMap<String, String>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn transport_failure(message: String) -> Self {
        Self {
            status: 0,
            status_text: "Unknown Error".to_string(),
            body: Value::String(message),
            headers: BTreeMap::new(),
        }
    }
}

/// Sends [`ApiRequest`]s.
pub struct ApiClient {
    http: Arc<reqwest::Client>,
}

impl ApiClient {
    pub fn new(http: Arc<reqwest::Client>) -> Self {
        Self { http }
    }

    /// Sends `request`, attaching `access_token` as a bearer token when given.
    ///
    /// # Errors
    ///
    /// Only for a body that cannot be serialized. Transport failures become
    /// a status 0 response.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tokenprobe::api::{ApiClient, ApiRequest};
    ///
    /// # tokio_test::block_on(async {
    /// let client = ApiClient::new(Arc::new(reqwest::Client::new()));
    /// let request = ApiRequest {
    ///     url: "http://127.0.0.1:1/nothing-listens-here".to_string(),
    ///     ..Default::default()
    /// };
    /// let response = client.make_request(&request, Some("token")).await.unwrap();
    /// assert_eq!(response.status, 0);
    /// # });
    /// ```
    pub async fn make_request(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse> {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        for (name, value) in &request.headers {
            // Case-insensitive override of the defaults.
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .http
            .request(request.method.to_reqwest(), &request.url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.method.has_body() {
            if let Some(body) = request.body.as_ref() {
                builder = builder.body(serde_json::to_vec(body)?);
            }
        }

        tracing::info!(
            method = %request.method,
            url = %request.url,
            authenticated = access_token.is_some(),
            "Sending API request"
        );

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "API request failed before a response was received");
                return Ok(ApiResponse::transport_failure(e.to_string()));
            }
        };

        let status = resp.status();
        let response_headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return Ok(ApiResponse::transport_failure(e.to_string())),
        };
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        tracing::debug!(status = status.as_u16(), "API response received");

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
            headers: response_headers,
        })
    }
}
