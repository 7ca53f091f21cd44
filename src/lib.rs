//! TokenProbe - OAuth2 / OIDC test client library
//!
//! This library provides the authentication core of TokenProbe: provider
//! configuration, the authorization-code flow controller with its manual
//! token-exchange fallback, JWT inspection and the persistent debug event log.
//!
//! # Architecture
//!
//! - `auth`: provider resolution, discovery, flow controller, token exchange,
//!   JWT decoding and the debug event log
//! - `api`: calls to the API under test with the current bearer token
//! - `storage`: key-value persistence (sled or in-memory)
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: the command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenprobe::auth::provider::{KeycloakConfig, ProviderConfig};
//! use tokenprobe::auth::{AuthController, MemoryNavigator, StandardOidcClient};
//! use tokenprobe::auth::manual_exchange::ManualTokenExchange;
//! use tokenprobe::storage::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http = Arc::new(reqwest::Client::new());
//!     let navigator = Arc::new(MemoryNavigator::new("http://localhost:4200/".parse()?));
//!     let controller = AuthController::new(
//!         Arc::new(StandardOidcClient::new(http.clone())),
//!         ManualTokenExchange::new(http),
//!         Arc::new(MemoryStore::new()),
//!         navigator,
//!     );
//!
//!     controller.configure(&ProviderConfig::Keycloak(KeycloakConfig {
//!         issuer: "https://kc.example.com/realms/dev".to_string(),
//!         client_id: "tokenprobe".to_string(),
//!         ..Default::default()
//!     }));
//!     let authorization_url = controller.login().await?;
//!     println!("{}", authorization_url);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;

// Re-export commonly used types
pub use auth::AuthController;
pub use config::Config;
pub use error::{Result, TokenProbeError};
