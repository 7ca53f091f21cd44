//! Command-line interface definition for TokenProbe
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// TokenProbe - OAuth2 / OIDC test client
///
/// Sign in against Keycloak or Microsoft Entra ID, inspect the tokens you get
/// back, and call an API with them.
#[derive(Parser, Debug, Clone)]
#[command(name = "tokenprobe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Directory of the settings and session store
    #[arg(long, global = true, env = "TOKENPROBE_STORE")]
    pub store: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for TokenProbe
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Save provider or API settings
    Configure {
        #[command(subcommand)]
        target: ConfigureTarget,
    },

    /// Make a provider current (keycloak, entra)
    Use {
        provider: String,
    },

    /// Show stored settings
    ShowConfig,

    /// Run the authorization-code flow in the browser
    Login {
        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the current session
    Status,

    /// Exchange the refresh token for new tokens
    Refresh,

    /// Sign out and print the provider logout URL
    Logout,

    /// Decode a JWT and show its claims
    Inspect {
        /// Token to inspect
        #[arg(conflicts_with_all = ["access", "id"])]
        token: Option<String>,

        /// Inspect the current access token
        #[arg(long)]
        access: bool,

        /// Inspect the current ID token
        #[arg(long, conflicts_with = "access")]
        id: bool,
    },

    /// Compare the claims of two JWTs
    Compare {
        token_a: String,
        token_b: String,
    },

    /// Call an API with the current access token
    Call {
        /// Absolute URL, or a path or endpoint name resolved against api.base_url
        target: String,

        /// GET, POST, PUT or DELETE
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header as `Name: value`; may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Send the request without the bearer token
        #[arg(long)]
        no_token: bool,
    },

    /// Show or clear the debug event log
    DebugLog {
        /// Remove all recorded events
        #[arg(long)]
        clear: bool,
    },
}

/// Settings targets for `configure`
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigureTarget {
    /// Keycloak realm client
    Keycloak {
        /// Realm URL, e.g. https://kc.example.com/realms/dev
        #[arg(long)]
        issuer: String,

        #[arg(long)]
        client_id: String,

        #[arg(long)]
        redirect_uri: Option<String>,

        #[arg(long)]
        scope: Option<String>,

        /// Use PKCE (S256)
        #[arg(long)]
        pkce: bool,
    },

    /// Microsoft Entra ID app registration
    Entra {
        #[arg(long)]
        tenant_id: String,

        #[arg(long)]
        client_id: String,

        /// Overrides https://login.microsoftonline.com/{tenant}
        #[arg(long)]
        authority: Option<String>,

        #[arg(long)]
        redirect_uri: Option<String>,

        #[arg(long)]
        scope: Option<String>,

        /// Disable PKCE
        #[arg(long)]
        no_pkce: bool,

        /// Load the discovery document instead of the built-in endpoints
        #[arg(long)]
        use_discovery: bool,

        #[arg(long)]
        authorization_endpoint: Option<String>,

        #[arg(long)]
        token_endpoint: Option<String>,

        #[arg(long)]
        userinfo_endpoint: Option<String>,

        #[arg(long)]
        logout_endpoint: Option<String>,
    },

    /// API under test
    Api {
        #[arg(long)]
        base_url: Option<String>,

        /// Named endpoint as `Name=/path`; may be repeated
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            store: None,
            verbose: false,
            command: Commands::Status,
        }
    }
}
