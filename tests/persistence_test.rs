//! Flow state surviving a process restart between redirect and callback

mod common;

use std::path::Path;
use std::sync::Arc;

use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenprobe::auth::controller::{PendingAuthorization, PENDING_AUTH_KEY};
use tokenprobe::auth::debug_log::DebugEventKind;
use tokenprobe::auth::manual_exchange::ManualTokenExchange;
use tokenprobe::auth::{AuthController, FlowState, MemoryNavigator};
use tokenprobe::storage::{load_json, KeyValueStore, SledStore};

use common::{keycloak_config, make_jwt, TokenlessOidcClient, ORIGIN};

struct Run {
    controller: AuthController,
    navigator: Arc<MemoryNavigator>,
    store: Arc<dyn KeyValueStore>,
}

fn run_at(store_path: &Path, current_url: &str) -> Run {
    let store: Arc<dyn KeyValueStore> = Arc::new(SledStore::open(store_path).unwrap());
    let navigator = Arc::new(MemoryNavigator::new(Url::parse(current_url).unwrap()));
    let controller = AuthController::new(
        Arc::new(TokenlessOidcClient::default()),
        ManualTokenExchange::new(Arc::new(reqwest::Client::new())),
        store.clone(),
        navigator.clone(),
    );
    Run {
        controller,
        navigator,
        store,
    }
}

#[tokio::test]
async fn test_callback_after_restart_uses_persisted_pending_state() {
    let server = MockServer::start().await;
    let access_token = make_jwt(serde_json::json!({
        "sub": "user-1",
        "exp": chrono::Utc::now().timestamp() + 3600
    }));
    Mock::given(method("POST"))
        .and(path("/realms/x/protocol/openid-connect/token"))
        .and(body_string_contains("code=XYZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store");

    // First run: save settings and redirect.
    let authorization_url = {
        let run = run_at(&store_path, ORIGIN);
        run.controller
            .settings()
            .save_provider_config(&keycloak_config(&server.uri()))
            .unwrap();
        let url = run.controller.login().await.unwrap();
        assert_eq!(run.navigator.redirects().len(), 1);
        let pending: Option<PendingAuthorization> =
            load_json(run.store.as_ref(), PENDING_AUTH_KEY);
        assert!(pending.is_some());
        url
    };
    let state = authorization_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    // Second run: the browser comes back with the code.
    let callback = format!("http://localhost:4200/auth?code=XYZ&state={}", state);
    {
        let run = run_at(&store_path, &callback);
        assert!(run.controller.initialize_auth().await);
        assert_eq!(run.controller.state(), FlowState::Authenticated);
        assert_eq!(run.navigator.replacements().len(), 1);
        assert!(run.store.get(PENDING_AUTH_KEY).is_none());

        let events: Vec<_> = run
            .controller
            .get_debug_log()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert!(events.contains(&DebugEventKind::AuthorizationRedirect));
        assert!(!events.contains(&DebugEventKind::StateMismatch));
        assert!(events.contains(&DebugEventKind::ManualExchangeSuccess));
    }

    // Third run: the session is restored from the store.
    let run = run_at(&store_path, ORIGIN);
    assert!(run.controller.initialize_auth().await);
    assert_eq!(
        run.controller.token_set().map(|t| t.access_token),
        Some(access_token)
    );
}

#[tokio::test]
async fn test_debug_log_survives_reopen_and_keeps_last_fifty() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store");

    {
        let run = run_at(&store_path, ORIGIN);
        for i in 0..60 {
            run.controller
                .debug_log()
                .record(DebugEventKind::Info, format!("event {}", i), None);
        }
    }

    let run = run_at(&store_path, ORIGIN);
    let events = run.controller.get_debug_log();
    assert_eq!(events.len(), 50);
    assert_eq!(events[0].message, "event 10");
    assert_eq!(events[49].message, "event 59");

    run.controller.clear_debug_log().unwrap();
    assert!(run.controller.get_debug_log().is_empty());
}

#[tokio::test]
async fn test_error_callback_discards_pending_authorization() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_at(
        &dir.path().join("store"),
        "http://localhost:4200/auth?error=access_denied",
    );
    run.store
        .set(PENDING_AUTH_KEY, r#"{"state":"S1"}"#)
        .unwrap();
    run.controller
        .configure(&keycloak_config("https://kc.invalid"));

    assert!(!run.controller.initialize_auth().await);
    assert!(run.store.get(PENDING_AUTH_KEY).is_none());
    assert_eq!(
        run.controller.error_message().as_deref(),
        Some("OAuth error: access_denied - ")
    );
}
