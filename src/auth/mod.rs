//! OAuth2 / OIDC client core
//!
//! Provider settings are resolved into [`provider::NormalizedAuthParams`],
//! the [`controller::AuthController`] drives the authorization-code flow,
//! and [`manual_exchange`] covers providers whose standard exchange yields
//! no usable token. [`jwt`] and [`debug_log`] serve the inspection views.

pub mod callback;
pub mod client;
pub mod controller;
pub mod debug_log;
pub mod discovery;
pub mod jwt;
pub mod manual_exchange;
pub mod navigator;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod settings;

pub use client::{OidcClient, StandardOidcClient};
pub use controller::AuthController;
pub use debug_log::{DebugEvent, DebugEventKind, DebugLog};
pub use navigator::{MemoryNavigator, Navigator, SystemBrowser};
pub use provider::{ProviderConfig, ProviderKind};
pub use session::{AuthSession, FlowState, TokenSet};
