//! OAuth flow controller
//!
//! [`AuthController`] owns the [`AuthSession`] and drives the
//! authorization-code flow:
//!
//! ```text
//! Unconfigured -> Configured -> DiscoveryLoading -> AwaitingRedirect
//!     (browser leaves and comes back)
//! CallbackReceived -> ExchangePending -> Authenticated | Failed
//! ```
//!
//! A redirect ends the process's involvement; everything needed to finish
//! the flow afterwards (state, nonce, PKCE verifier, redirect URI) is
//! persisted as a [`PendingAuthorization`] before leaving and read back by
//! [`AuthController::initialize_auth`] on the next load.
//!
//! Token exchange succeeds only if a usable access token is observable
//! afterwards. When a code was received but the standard exchange did not
//! produce one, the manual exchange runs exactly once.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use url::Url;

use crate::auth::callback::{strip_authorization_params, AuthorizationResponse};
use crate::auth::client::{CodeExchange, OidcClient};
use crate::auth::debug_log::{DebugEvent, DebugEventKind, DebugLog, DEFAULT_DEBUG_LOG_CAPACITY};
use crate::auth::discovery::ProviderEndpoints;
use crate::auth::jwt::{self, DecodedToken};
use crate::auth::manual_exchange::{ManualExchangeRequest, ManualTokenExchange};
use crate::auth::pkce;
use crate::auth::provider::{resolve, NormalizedAuthParams, ProviderConfig, ProviderKind};
use crate::auth::session::{
    has_usable_access_token, is_token_valid_at, AuthSession, FlowState, TokenSet, TOKEN_SET_KEY,
};
use crate::auth::navigator::Navigator;
use crate::auth::settings::ConfigStore;
use crate::error::{Result, TokenProbeError};
use crate::storage::{load_json, save_json, KeyValueStore};

/// Storage slot for the record written before each redirect.
pub const PENDING_AUTH_KEY: &str = "tokenprobe-pending-auth";

/// Flow context that must survive the redirect to the provider and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    pub provider: ProviderKind,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
}

/// Resolved parameters plus the endpoints once known.
#[derive(Debug, Clone)]
struct ActiveProvider {
    params: NormalizedAuthParams,
    endpoints: Option<ProviderEndpoints>,
}

/// Clears the processing flag when dropped.
struct ProcessingGuard<'a> {
    session: &'a watch::Sender<AuthSession>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.session.send_modify(|s| s.processing = false);
    }
}

/// Extracts the text a user should see for `err`.
fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<TokenProbeError>() {
        Some(TokenProbeError::Discovery { message, .. }) => message.clone(),
        Some(TokenProbeError::DiscoveryValidation(message)) => {
            format!("Discovery document validation failed: {}", message)
        }
        Some(TokenProbeError::Config(message))
        | Some(TokenProbeError::Exchange(message))
        | Some(TokenProbeError::Refresh(message)) => message.clone(),
        _ => err.to_string(),
    }
}

fn abbreviate(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    if prefix.len() < value.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

/// Drives the authorization-code flow and owns the session.
pub struct AuthController {
    oidc: Arc<dyn OidcClient>,
    manual: ManualTokenExchange,
    settings: ConfigStore,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    debug_log: DebugLog,
    strict_state: bool,
    session: watch::Sender<AuthSession>,
    active: RwLock<Option<ActiveProvider>>,
}

impl AuthController {
    /// Creates a controller. Settings, pending authorizations, the token set
    /// and the debug log all live in `store`.
    pub fn new(
        oidc: Arc<dyn OidcClient>,
        manual: ManualTokenExchange,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (session, _) = watch::channel(AuthSession::default());
        Self {
            oidc,
            manual,
            settings: ConfigStore::new(store.clone()),
            debug_log: DebugLog::new(store.clone(), DEFAULT_DEBUG_LOG_CAPACITY),
            store,
            navigator,
            strict_state: false,
            session,
            active: RwLock::new(None),
        }
    }

    /// Abort on a state mismatch instead of logging and continuing.
    pub fn with_strict_state(mut self, strict: bool) -> Self {
        self.strict_state = strict;
        self
    }

    pub fn with_debug_log_capacity(mut self, capacity: usize) -> Self {
        self.debug_log = DebugLog::new(self.store.clone(), capacity);
        self
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// Snapshot of the session.
    pub fn session(&self) -> AuthSession {
        self.session.borrow().clone()
    }

    /// Receiver that observes every session change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.session.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().authenticated
    }

    pub fn token_set(&self) -> Option<TokenSet> {
        self.session.borrow().token_set.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.session.borrow().error_message.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.session.borrow().processing
    }

    pub fn state(&self) -> FlowState {
        self.session.borrow().state
    }

    /// Validity of the current access token, from its `exp` claim.
    pub fn has_valid_token(&self) -> bool {
        self.session.borrow().has_valid_token()
    }

    /// Parameters resolved by the last successful [`configure`](Self::configure).
    pub fn params(&self) -> Option<NormalizedAuthParams> {
        self.active_provider().map(|a| a.params)
    }

    pub fn settings(&self) -> &ConfigStore {
        &self.settings
    }

    pub fn get_decoded_token(&self, token: &str) -> Option<DecodedToken> {
        jwt::decode(token)
    }

    pub fn get_debug_log(&self) -> Vec<DebugEvent> {
        self.debug_log.read()
    }

    pub fn clear_debug_log(&self) -> Result<()> {
        self.debug_log.clear()
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Resolves `config` and arms the controller with it.
    ///
    /// Returns false (and records the reason) when the settings are not
    /// usable. Never returns an error.
    pub fn configure(&self, config: &ProviderConfig) -> bool {
        let origin = self.origin();
        match resolve(config, &origin) {
            Ok(params) => {
                let endpoints = if params.bypasses_discovery() {
                    ProviderEndpoints::from_overrides(&params.endpoints)
                } else {
                    None
                };
                self.debug_log.record(
                    DebugEventKind::Configured,
                    format!("Configured {}", params.provider.display_name()),
                    Some(json!({
                        "authority": params.authority,
                        "client_id": params.client_id,
                        "redirect_uri": params.redirect_uri,
                        "scope": params.scope,
                        "use_pkce": params.use_pkce,
                        "bypasses_discovery": params.bypasses_discovery(),
                    })),
                );
                if let Ok(mut active) = self.active.write() {
                    *active = Some(ActiveProvider { params, endpoints });
                }
                self.session.send_modify(|s| {
                    if s.state != FlowState::Authenticated {
                        s.state = FlowState::Configured;
                    }
                });
                true
            }
            Err(e) => {
                let message = user_message(&e);
                self.debug_log
                    .record(DebugEventKind::ConfigurationError, message.clone(), None);
                self.session.send_modify(|s| s.error_message = Some(message));
                false
            }
        }
    }

    /// Configures from the current provider in the settings store.
    pub fn configure_from_settings(&self) -> bool {
        match self.settings.current_provider_config() {
            Some(config) => self.configure(&config),
            None => false,
        }
    }

    fn active_provider(&self) -> Option<ActiveProvider> {
        self.active.read().ok().and_then(|a| a.clone())
    }

    fn set_endpoints(&self, endpoints: ProviderEndpoints) {
        if let Ok(mut active) = self.active.write() {
            if let Some(active) = active.as_mut() {
                active.endpoints = Some(endpoints);
            }
        }
    }

    /// Active provider, configuring from settings first if needed.
    fn ensure_configured(&self) -> Option<ActiveProvider> {
        if let Some(active) = self.active_provider() {
            return Some(active);
        }
        if self.configure_from_settings() {
            self.active_provider()
        } else {
            None
        }
    }

    fn origin(&self) -> Url {
        let current = self.navigator.current_url();
        Url::parse(&current.origin().ascii_serialization()).unwrap_or(current)
    }

    fn begin(&self) -> Result<ProcessingGuard<'_>> {
        let acquired = self.session.send_if_modified(|s| {
            if s.processing {
                false
            } else {
                s.processing = true;
                true
            }
        });
        if acquired {
            Ok(ProcessingGuard {
                session: &self.session,
            })
        } else {
            Err(TokenProbeError::Busy.into())
        }
    }

    fn set_state(&self, state: FlowState) {
        self.session.send_modify(|s| s.state = state);
    }

    fn fail(&self, kind: DebugEventKind, message: String, payload: Option<serde_json::Value>) {
        self.debug_log.record(kind, message.clone(), payload);
        self.session.send_modify(|s| {
            s.state = FlowState::Failed;
            s.authenticated = false;
            s.error_message = Some(message);
        });
    }

    /// Loads the discovery document unless endpoints are already known.
    async fn ensure_endpoints(&self, active: &ActiveProvider) -> Result<ProviderEndpoints> {
        if let Some(endpoints) = active.endpoints.clone() {
            return Ok(endpoints);
        }

        self.set_state(FlowState::DiscoveryLoading);
        let document = self.oidc.load_discovery_document(&active.params).await?;
        let endpoints = ProviderEndpoints::from_document(&document, &active.params.endpoints);

        self.debug_log.record(
            DebugEventKind::DiscoveryLoaded,
            format!("Discovery document loaded from {}", active.params.discovery_url()),
            Some(json!({
                "issuer": document.issuer,
                "authorization_endpoint": endpoints.authorization_endpoint,
                "token_endpoint": endpoints.token_endpoint,
            })),
        );
        self.set_endpoints(endpoints.clone());
        Ok(endpoints)
    }

    fn discovery_failure_kind(err: &anyhow::Error) -> DebugEventKind {
        match err.downcast_ref::<TokenProbeError>() {
            Some(TokenProbeError::DiscoveryValidation(_)) => {
                DebugEventKind::DiscoveryValidationError
            }
            _ => DebugEventKind::DiscoveryError,
        }
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Starts the authorization-code flow and redirects to the provider.
    ///
    /// Returns the authorization URL that was navigated to.
    ///
    /// # Errors
    ///
    /// - `TokenProbeError::Busy` while another step is in flight.
    /// - `TokenProbeError::Config` when no usable settings exist; no request
    ///   is sent and the state is left unchanged.
    /// - Discovery errors, classified and with a provider-specific message.
    pub async fn login(&self) -> Result<Url> {
        let _guard = self.begin()?;
        self.session.send_modify(|s| s.error_message = None);

        let Some(active) = self.ensure_configured() else {
            let message = format!(
                "Please configure {} settings first",
                self.settings.current_provider().display_name()
            );
            self.debug_log
                .record(DebugEventKind::ConfigurationError, message.clone(), None);
            self.session
                .send_modify(|s| s.error_message = Some(message.clone()));
            return Err(TokenProbeError::Config(message).into());
        };
        let params = active.params.clone();

        let endpoints = match self.ensure_endpoints(&active).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                let kind = Self::discovery_failure_kind(&e);
                self.fail(kind, user_message(&e), Some(json!({ "detail": e.to_string() })));
                return Err(e);
            }
        };

        if params.use_pkce && endpoints.supports_s256 == Some(false) {
            tracing::warn!("Provider does not advertise PKCE S256; sending it anyway");
            self.debug_log.record(
                DebugEventKind::Info,
                "Discovery document does not list S256 in code_challenge_methods_supported",
                None,
            );
        }

        let challenge = params.use_pkce.then(pkce::generate);
        let pending = PendingAuthorization {
            state: pkce::random_token(16),
            nonce: pkce::random_token(16),
            code_verifier: challenge.as_ref().map(|c| c.verifier.clone()),
            provider: params.provider,
            redirect_uri: params.redirect_uri.clone(),
            created_at: Utc::now(),
        };

        let mut url = match Url::parse(&endpoints.authorization_endpoint) {
            Ok(url) => url,
            Err(e) => {
                let message = format!(
                    "Invalid authorization endpoint URL {}: {}",
                    endpoints.authorization_endpoint, e
                );
                self.fail(DebugEventKind::ConfigurationError, message.clone(), None);
                return Err(TokenProbeError::Config(message).into());
            }
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &params.client_id);
            query.append_pair("redirect_uri", &pending.redirect_uri);
            query.append_pair("scope", &params.scope);
            query.append_pair("state", &pending.state);
            query.append_pair("nonce", &pending.nonce);
            if let Some(challenge) = challenge.as_ref() {
                query.append_pair("code_challenge", &challenge.challenge);
                query.append_pair("code_challenge_method", &challenge.method);
            }
            if let Some(mode) = params.response_mode.as_deref() {
                query.append_pair("response_mode", mode);
            }
        }

        if let Err(e) = save_json(self.store.as_ref(), PENDING_AUTH_KEY, &pending) {
            self.fail(
                DebugEventKind::CodeError,
                format!("Failed to save the pending authorization: {}", e),
                None,
            );
            return Err(e);
        }

        self.debug_log.record(
            DebugEventKind::AuthorizationRedirect,
            format!("Redirecting to {}", params.provider.display_name()),
            Some(json!({
                "authorization_endpoint": endpoints.authorization_endpoint,
                "client_id": params.client_id,
                "redirect_uri": pending.redirect_uri,
                "scope": params.scope,
                "pkce": challenge.is_some(),
            })),
        );
        self.set_state(FlowState::AwaitingRedirect);
        if let Err(e) = self.navigator.redirect(&url) {
            self.fail(
                DebugEventKind::CodeError,
                format!("Failed to redirect to the authorization endpoint: {}", e),
                Some(json!({ "url": url.as_str() })),
            );
            self.remove_pending();
            return Err(e);
        }
        Ok(url)
    }

    // -----------------------------------------------------------------------
    // Callback handling
    // -----------------------------------------------------------------------

    /// Processes a callback on the current URL, or restores a saved session.
    ///
    /// Call once per application load. Returns true when the session ends
    /// up authenticated. Ignored (returns false) while another step runs.
    pub async fn initialize_auth(&self) -> bool {
        let Ok(_guard) = self.begin() else {
            tracing::debug!("initialize_auth ignored: another step is in progress");
            return false;
        };

        let current_url = self.navigator.current_url();
        let response = AuthorizationResponse::from_url(&current_url);

        let Some(active) = self.ensure_configured() else {
            if response.is_some() {
                let message = format!(
                    "{} configuration not found. Please configure first.",
                    self.settings.current_provider().display_name()
                );
                self.debug_log
                    .record(DebugEventKind::ConfigurationError, message.clone(), None);
                self.session.send_modify(|s| s.error_message = Some(message));
            }
            return false;
        };

        match response {
            None => self.restore_session(),
            Some(AuthorizationResponse::Error { error, description }) => {
                let payload = json!({ "error": error, "error_description": description });
                let message = TokenProbeError::Authorization { error, description }.to_string();
                self.fail(DebugEventKind::CodeError, message, Some(payload));
                self.remove_pending();
                false
            }
            Some(AuthorizationResponse::Code {
                code,
                state,
                session_state,
            }) => {
                self.handle_code(&active, &current_url, &code, state, session_state)
                    .await
            }
        }
    }

    async fn handle_code(
        &self,
        active: &ActiveProvider,
        current_url: &Url,
        code: &str,
        received_state: Option<String>,
        session_state: Option<String>,
    ) -> bool {
        let params = &active.params;
        self.set_state(FlowState::CallbackReceived);
        self.debug_log.record(
            DebugEventKind::CodeReceived,
            "Authorization code received",
            Some(json!({
                "code": abbreviate(code),
                "state": received_state,
                "session_state": session_state,
            })),
        );

        let pending: Option<PendingAuthorization> =
            load_json(self.store.as_ref(), PENDING_AUTH_KEY);

        // Discovery has to finish before the response is processed.
        let endpoints = match self.ensure_endpoints(active).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                let kind = Self::discovery_failure_kind(&e);
                self.fail(kind, user_message(&e), Some(json!({ "detail": e.to_string() })));
                self.remove_pending();
                return false;
            }
        };

        let expected_state = pending.as_ref().map(|p| p.state.clone());
        if expected_state != received_state {
            let expected = expected_state.unwrap_or_default();
            let received = received_state.unwrap_or_default();
            tracing::warn!(%expected, %received, strict = self.strict_state, "State mismatch on callback");
            self.debug_log.record(
                DebugEventKind::StateMismatch,
                if self.strict_state {
                    "State mismatch; aborting"
                } else {
                    "State mismatch; continuing with token exchange"
                },
                Some(json!({ "expected": expected, "received": received })),
            );
            if self.strict_state {
                let message = TokenProbeError::StateMismatch { expected, received }.to_string();
                self.fail(DebugEventKind::CodeError, message, None);
                self.remove_pending();
                return false;
            }
        }

        if let Some(p) = pending.as_ref() {
            if p.provider != params.provider {
                self.debug_log.record(
                    DebugEventKind::Info,
                    format!(
                        "Pending authorization was started for {} but {} is configured",
                        p.provider, params.provider
                    ),
                    None,
                );
            }
        }

        let redirect_uri = pending
            .as_ref()
            .map(|p| p.redirect_uri.clone())
            .unwrap_or_else(|| params.redirect_uri.clone());
        let code_verifier = pending.as_ref().and_then(|p| p.code_verifier.clone());
        let nonce = pending.as_ref().map(|p| p.nonce.clone());

        self.set_state(FlowState::ExchangePending);

        let exchange = CodeExchange {
            code: code.to_string(),
            redirect_uri: redirect_uri.clone(),
            code_verifier: code_verifier.clone(),
            nonce,
        };

        let mut last_error: Option<String> = None;
        let standard = match self.oidc.exchange_code(params, &endpoints, &exchange).await {
            Ok(response) => {
                let usable = has_usable_access_token(response.access_token.as_deref());
                if usable {
                    response.into_token_set()
                } else {
                    self.debug_log.record(
                        DebugEventKind::TokenExchangeError,
                        "Standard exchange returned no usable access token",
                        Some(json!({
                            "access_token_length": response.access_token.as_ref().map(|t| t.len()),
                        })),
                    );
                    None
                }
            }
            Err(e) => {
                let message = format!("Token exchange failed: {}", user_message(&e));
                self.debug_log
                    .record(DebugEventKind::TokenExchangeError, message.clone(), None);
                last_error = Some(message);
                None
            }
        };

        let tokens = match standard {
            Some(tokens) => {
                self.debug_log.record(
                    DebugEventKind::TokenReceived,
                    "Tokens received from standard exchange",
                    Some(json!({
                        "has_refresh_token": tokens.refresh_token.is_some(),
                        "has_id_token": tokens.id_token.is_some(),
                    })),
                );
                Some(tokens)
            }
            None if !ManualTokenExchange::supports(params.provider) => {
                let message = TokenProbeError::ManualExchangeUnavailable(
                    params.provider.display_name().to_string(),
                )
                .to_string();
                self.debug_log.record(
                    DebugEventKind::ManualExchangeUnavailable,
                    message.clone(),
                    None,
                );
                last_error = Some(match last_error {
                    Some(previous) => format!("{}. {}", previous, message),
                    None => message,
                });
                None
            }
            None => {
                self.debug_log.record(
                    DebugEventKind::ManualExchangeStart,
                    "Starting manual token exchange",
                    Some(json!({
                        "token_endpoint": endpoints.token_endpoint,
                        "code": abbreviate(code),
                    })),
                );
                let request = ManualExchangeRequest {
                    code,
                    redirect_uri: &redirect_uri,
                    client_id: &params.client_id,
                    code_verifier: code_verifier.as_deref(),
                };
                match self
                    .manual
                    .exchange(params, &endpoints.token_endpoint, &request)
                    .await
                {
                    Ok(tokens) => {
                        self.debug_log.record(
                            DebugEventKind::ManualExchangeSuccess,
                            "Manual token exchange succeeded",
                            Some(json!({
                                "has_refresh_token": tokens.refresh_token.is_some(),
                                "has_id_token": tokens.id_token.is_some(),
                            })),
                        );
                        Some(tokens)
                    }
                    Err(e) => {
                        let message = user_message(&e);
                        self.debug_log
                            .record(DebugEventKind::ManualExchangeFail, message.clone(), None);
                        last_error = Some(message);
                        None
                    }
                }
            }
        };

        self.remove_pending();

        match tokens {
            Some(tokens) => {
                self.authenticate(tokens);
                let clean = strip_authorization_params(current_url);
                if let Err(e) = self.navigator.replace_url(&clean) {
                    tracing::warn!(error = %e, "Failed to clean callback URL");
                }
                true
            }
            None => {
                let message = last_error.unwrap_or_else(|| {
                    format!(
                        "Token exchange failed. Check {} client configuration.",
                        params.provider.display_name()
                    )
                });
                self.session.send_modify(|s| {
                    s.state = FlowState::Failed;
                    s.authenticated = false;
                    s.token_set = None;
                    s.error_message = Some(message);
                });
                false
            }
        }
    }

    fn authenticate(&self, tokens: TokenSet) {
        if let Err(e) = save_json(self.store.as_ref(), TOKEN_SET_KEY, &tokens) {
            tracing::warn!(error = %e, "Failed to persist token set");
        }
        self.session.send_modify(|s| {
            s.authenticated = true;
            s.token_set = Some(tokens);
            s.error_message = None;
            s.state = FlowState::Authenticated;
        });
    }

    fn remove_pending(&self) {
        if let Err(e) = self.store.remove(PENDING_AUTH_KEY) {
            tracing::warn!(error = %e, "Failed to remove pending authorization");
        }
    }

    fn restore_session(&self) -> bool {
        let Some(tokens) = load_json::<TokenSet>(self.store.as_ref(), TOKEN_SET_KEY) else {
            return self.is_authenticated();
        };

        if is_token_valid_at(&tokens.access_token, Utc::now()) {
            self.debug_log.record(
                DebugEventKind::SessionRestored,
                "Restored saved session",
                Some(json!({ "expires_at": tokens.expires_at })),
            );
            self.session.send_modify(|s| {
                s.authenticated = true;
                s.token_set = Some(tokens);
                s.state = FlowState::Authenticated;
            });
            true
        } else {
            tracing::debug!("Discarding saved token set without a valid access token");
            if let Err(e) = self.store.remove(TOKEN_SET_KEY) {
                tracing::warn!(error = %e, "Failed to remove stale token set");
            }
            false
        }
    }

    // -----------------------------------------------------------------------
    // Refresh and logout
    // -----------------------------------------------------------------------

    /// Exchanges the refresh token for new tokens.
    ///
    /// On failure the current tokens and the authenticated flag are kept.
    ///
    /// # Errors
    ///
    /// `TokenProbeError::Busy`, `TokenProbeError::MissingRefreshToken`,
    /// `TokenProbeError::Config` when unconfigured, discovery errors, or
    /// `TokenProbeError::Refresh`.
    pub async fn refresh_token(&self) -> Result<TokenSet> {
        let _guard = self.begin()?;

        let current = self.token_set();
        let Some(refresh_token) = current.as_ref().and_then(|t| t.refresh_token.clone()) else {
            let message = TokenProbeError::MissingRefreshToken.to_string();
            self.debug_log
                .record(DebugEventKind::TokenRefreshError, message.clone(), None);
            self.session.send_modify(|s| {
                s.error_message = Some(format!("Token refresh failed: {}", message));
            });
            return Err(TokenProbeError::MissingRefreshToken.into());
        };

        let Some(active) = self.ensure_configured() else {
            let message = "Cannot refresh without a configured provider".to_string();
            self.debug_log
                .record(DebugEventKind::TokenRefreshError, message.clone(), None);
            self.session.send_modify(|s| {
                s.error_message = Some(format!("Token refresh failed: {}", message));
            });
            return Err(TokenProbeError::Config(message).into());
        };

        let previous_state = self.state();
        let endpoints = match self.ensure_endpoints(&active).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.debug_log.record(
                    DebugEventKind::TokenRefreshError,
                    user_message(&e),
                    None,
                );
                self.set_state(previous_state);
                return Err(e);
            }
        };

        self.set_state(FlowState::ExchangePending);
        let result = self
            .oidc
            .refresh(&active.params, &endpoints, &refresh_token)
            .await
            .and_then(|response| {
                response.into_token_set().ok_or_else(|| {
                    TokenProbeError::Refresh("refresh response has no access_token".to_string())
                        .into()
                })
            });

        match result {
            Ok(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                if tokens.id_token.is_none() {
                    tokens.id_token = current.and_then(|t| t.id_token);
                }
                self.debug_log.record(
                    DebugEventKind::TokenRefreshed,
                    "Access token refreshed",
                    Some(json!({ "expires_at": tokens.expires_at })),
                );
                self.authenticate(tokens.clone());
                Ok(tokens)
            }
            Err(e) => {
                let message = user_message(&e);
                self.debug_log
                    .record(DebugEventKind::TokenRefreshError, message.clone(), None);
                self.session.send_modify(|s| {
                    s.state = previous_state;
                    s.error_message = Some(format!("Token refresh failed: {}", message));
                });
                Err(e)
            }
        }
    }

    /// Signs out locally and returns the provider's end-session URL, if any.
    ///
    /// Tokens are revoked first when the provider supports it; revocation
    /// failures are recorded but never prevent the local session from being
    /// cleared.
    ///
    /// # Errors
    ///
    /// `TokenProbeError::Busy` while another step is in flight. Nothing is
    /// cleared in that case.
    pub async fn logout(&self) -> Result<Option<Url>> {
        let _guard = self.begin()?;
        let tokens = self.token_set();
        let active = self.active_provider();

        let mut end_session = None;
        if let Some(active) = active.as_ref() {
            let endpoints = match self.ensure_endpoints(active).await {
                Ok(endpoints) => Some(endpoints),
                Err(e) => {
                    tracing::debug!(error = %e, "No endpoints available for logout");
                    None
                }
            };

            if let (Some(endpoints), Some(tokens)) = (endpoints.as_ref(), tokens.as_ref()) {
                self.revoke_tokens(&active.params, endpoints, tokens).await;
            }

            end_session = endpoints
                .as_ref()
                .and_then(|e| e.end_session_endpoint.as_deref())
                .and_then(|endpoint| Url::parse(endpoint).ok())
                .map(|mut url| {
                    {
                        let mut query = url.query_pairs_mut();
                        query.append_pair("client_id", &active.params.client_id);
                        query.append_pair("post_logout_redirect_uri", self.origin().as_str());
                        if let Some(id_token) = tokens.as_ref().and_then(|t| t.id_token.as_deref()) {
                            query.append_pair("id_token_hint", id_token);
                        }
                    }
                    url
                });
        }

        if let Err(e) = self.store.remove(TOKEN_SET_KEY) {
            tracing::warn!(error = %e, "Failed to remove saved token set");
        }
        self.remove_pending();

        let configured = active.is_some();
        self.session.send_modify(|s| {
            s.authenticated = false;
            s.token_set = None;
            s.error_message = None;
            s.state = if configured {
                FlowState::Configured
            } else {
                FlowState::Unconfigured
            };
        });
        self.debug_log.record(
            DebugEventKind::Logout,
            "Signed out",
            Some(json!({ "end_session_url": end_session.as_ref().map(Url::as_str) })),
        );

        Ok(end_session)
    }

    async fn revoke_tokens(
        &self,
        params: &NormalizedAuthParams,
        endpoints: &ProviderEndpoints,
        tokens: &TokenSet,
    ) {
        let mut candidates = vec![(tokens.access_token.as_str(), "access_token")];
        if let Some(refresh) = tokens.refresh_token.as_deref() {
            candidates.insert(0, (refresh, "refresh_token"));
        }

        for (token, hint) in candidates {
            match self.oidc.revoke(params, endpoints, token, hint).await {
                Ok(true) => tracing::debug!(hint, "Token revoked"),
                Ok(false) => {
                    tracing::debug!("Provider has no revocation endpoint");
                    return;
                }
                Err(e) => {
                    self.debug_log.record(
                        DebugEventKind::RevocationError,
                        format!("Failed to revoke {}: {}", hint, e),
                        None,
                    );
                }
            }
        }
    }
}
