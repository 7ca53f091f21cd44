//! Discovery fetch and validation against a wiremock provider

mod common;

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenprobe::auth::discovery::{fetch_discovery_document, ProviderEndpoints};
use tokenprobe::auth::provider::{resolve, EntraConfig, ProviderConfig};
use tokenprobe::auth::{OidcClient, StandardOidcClient};
use tokenprobe::error::{DiscoveryFailureKind, TokenProbeError};

use common::{keycloak_config, keycloak_discovery, ORIGIN};

fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

fn discovery_failure(err: &anyhow::Error) -> (DiscoveryFailureKind, Option<u16>, String) {
    match err.downcast_ref::<TokenProbeError>() {
        Some(TokenProbeError::Discovery {
            kind,
            status,
            message,
        }) => (*kind, *status, message.clone()),
        other => panic!("expected a discovery error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keycloak_discovery_document_is_loaded_and_validated() {
    let server = MockServer::start().await;
    let authority = format!("{}/realms/x", server.uri());
    Mock::given(method("GET"))
        .and(path("/realms/x/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(keycloak_discovery(&authority)))
        .expect(1)
        .mount(&server)
        .await;

    let params = resolve(&keycloak_config(&server.uri()), &origin()).unwrap();
    let client = StandardOidcClient::new(std::sync::Arc::new(reqwest::Client::new()));
    let document = client.load_discovery_document(&params).await.unwrap();

    let endpoints = ProviderEndpoints::from_document(&document, &params.endpoints);
    assert_eq!(
        endpoints.token_endpoint,
        format!("{}/protocol/openid-connect/token", authority)
    );
    assert_eq!(endpoints.supports_s256, Some(true));
    assert!(endpoints.revocation_endpoint.is_some());
}

#[tokio::test]
async fn test_missing_realm_is_classified_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Realm does not exist"))
        .mount(&server)
        .await;

    let params = resolve(&keycloak_config(&server.uri()), &origin()).unwrap();
    let err = fetch_discovery_document(&reqwest::Client::new(), &params)
        .await
        .unwrap_err();

    let (kind, status, message) = discovery_failure(&err);
    assert_eq!(kind, DiscoveryFailureKind::NotFound);
    assert_eq!(status, Some(404));
    assert_eq!(message, "Keycloak realm not found. Please check your issuer URL.");
}

#[tokio::test]
async fn test_server_error_is_classified_as_other() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let params = resolve(&keycloak_config(&server.uri()), &origin()).unwrap();
    let err = fetch_discovery_document(&reqwest::Client::new(), &params)
        .await
        .unwrap_err();

    let (kind, status, message) = discovery_failure(&err);
    assert_eq!(kind, DiscoveryFailureKind::Other);
    assert_eq!(status, Some(500));
    assert!(message.starts_with("Login failed:"));
    assert!(message.contains("boom"));
}

#[tokio::test]
async fn test_unreachable_server_is_classified_as_connection_refused() {
    let params = resolve(&keycloak_config("http://127.0.0.1:1"), &origin()).unwrap();
    let err = fetch_discovery_document(&reqwest::Client::new(), &params)
        .await
        .unwrap_err();

    let (kind, status, message) = discovery_failure(&err);
    assert_eq!(kind, DiscoveryFailureKind::ConnectionRefused);
    assert_eq!(status, None);
    assert!(message.contains("Server is running and accessible"));
}

#[tokio::test]
async fn test_entra_discovery_uses_v2_path_and_skips_issuer_check() {
    let server = MockServer::start().await;
    let authority = format!("{}/contoso", server.uri());
    Mock::given(method("GET"))
        .and(path("/contoso/v2.0/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": "https://login.microsoftonline.com/{tenantid}/v2.0",
            "authorization_endpoint": format!("{}/oauth2/v2.0/authorize", authority),
            "token_endpoint": format!("{}/oauth2/v2.0/token", authority)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ProviderConfig::Entra(EntraConfig {
        tenant_id: "contoso".to_string(),
        client_id: "app-1".to_string(),
        authority: Some(authority.clone()),
        use_discovery: true,
        ..Default::default()
    });
    let params = resolve(&config, &origin()).unwrap();
    assert!(!params.bypasses_discovery());

    let client = StandardOidcClient::new(std::sync::Arc::new(reqwest::Client::new()));
    let document = client.load_discovery_document(&params).await.unwrap();
    assert_eq!(
        document.token_endpoint,
        format!("{}/oauth2/v2.0/token", authority)
    );
}

#[tokio::test]
async fn test_keycloak_issuer_mismatch_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(keycloak_discovery("https://other/realms/y")),
        )
        .mount(&server)
        .await;

    let params = resolve(&keycloak_config(&server.uri()), &origin()).unwrap();
    let client = StandardOidcClient::new(std::sync::Arc::new(reqwest::Client::new()));
    let err = client.load_discovery_document(&params).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TokenProbeError>(),
        Some(TokenProbeError::DiscoveryValidation(_))
    ));
}
