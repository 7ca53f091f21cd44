//! TokenProbe - OAuth2 / OIDC test client
//!
#![doc = "Main entry point for the TokenProbe CLI."]

use anyhow::Result;

use tokenprobe::cli::{Cli, Commands};
use tokenprobe::commands::{self, AppContext};
use tokenprobe::config::Config;
use tokenprobe::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path, &cli)?;

    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    // Commands that never touch the store
    if let Commands::Compare { token_a, token_b } = &cli.command {
        return commands::inspect::compare(token_a, token_b);
    }

    if let Commands::Login { no_browser: true } = cli.command {
        config.auth.open_browser = false;
    }

    let ctx = AppContext::new(config)?;

    // Execute command
    match cli.command {
        Commands::Configure { target } => commands::settings::configure(&ctx, target),
        Commands::Use { provider } => commands::settings::use_provider(&ctx, &provider),
        Commands::ShowConfig => commands::settings::show_config(&ctx),
        Commands::Login { .. } => commands::session::login(&ctx).await,
        Commands::Status => commands::session::status(&ctx).await,
        Commands::Refresh => commands::session::refresh(&ctx).await,
        Commands::Logout => commands::session::logout(&ctx).await,
        Commands::Inspect { token, access, id } => {
            let source = commands::inspect::TokenSource::from_args(token, access, id);
            commands::inspect::inspect(&ctx, source).await
        }
        Commands::Compare { token_a, token_b } => commands::inspect::compare(&token_a, &token_b),
        Commands::Call {
            target,
            method,
            data,
            headers,
            no_token,
        } => {
            let args = commands::api::CallArgs {
                target,
                method,
                data,
                headers,
                no_token,
            };
            commands::api::call(&ctx, args).await
        }
        Commands::DebugLog { clear } => commands::debug_log::show(&ctx, clear),
    }
}
