//! Session commands: `login`, `status`, `refresh` and `logout`

use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use prettytable::{format, row, Table};
use tokio::net::TcpListener;
use url::Url;

use crate::auth::callback::receive_callback;
use crate::auth::session::FlowState;
use crate::commands::{or_dash, AppContext};
use crate::error::{Result, TokenProbeError};

/// How long `login` waits for the browser to come back.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Origin and bind address the callback listener uses for `redirect_uri`.
fn callback_binding(redirect_uri: &str) -> Result<(Url, String)> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| TokenProbeError::Config(format!("Invalid redirect URI: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| TokenProbeError::Config(format!("Redirect URI has no host: {}", url)))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let origin = Url::parse(&url.origin().ascii_serialization())
        .map_err(|e| TokenProbeError::Config(format!("Invalid redirect URI: {}", e)))?;
    Ok((origin, format!("{}:{}", host, port)))
}

/// Restores a saved session, if any.
async fn restore(ctx: &AppContext) {
    ctx.controller.initialize_auth().await;
}

/// Handle `login`
pub async fn login(ctx: &AppContext) -> Result<()> {
    ctx.controller.configure_from_settings();

    // Bind before redirecting so the callback cannot arrive first.
    let listener = match ctx.controller.params() {
        Some(params) => {
            let (origin, bind) = callback_binding(&params.redirect_uri)?;
            let listener = TcpListener::bind(&bind).await.map_err(|e| {
                TokenProbeError::Callback(format!("Cannot listen on {}: {}", bind, e))
            })?;
            tracing::info!(address = %bind, "Waiting for the authorization callback");
            Some((listener, origin))
        }
        None => None,
    };

    if let Err(e) = ctx.controller.login().await {
        let message = ctx
            .controller
            .error_message()
            .unwrap_or_else(|| e.to_string());
        eprintln!("{} {}", "Login failed:".red().bold(), message);
        return Err(e);
    }

    let Some((listener, origin)) = listener else {
        return Ok(());
    };

    println!("{}", "Waiting for the browser to return...".dimmed());
    let callback_url = tokio::time::timeout(CALLBACK_TIMEOUT, receive_callback(listener, &origin))
        .await
        .map_err(|_| TokenProbeError::Callback("Timed out waiting for the callback".to_string()))??;

    ctx.navigator.navigate_to(callback_url);
    if ctx.controller.initialize_auth().await {
        println!("{}", "Signed in.".green().bold());
        print_session(ctx);
        Ok(())
    } else {
        let message = ctx
            .controller
            .error_message()
            .unwrap_or_else(|| "Authentication failed".to_string());
        eprintln!("{} {}", "Login failed:".red().bold(), message);
        Err(TokenProbeError::Exchange(message).into())
    }
}

/// Handle `status`
pub async fn status(ctx: &AppContext) -> Result<()> {
    restore(ctx).await;
    print_session(ctx);
    Ok(())
}

fn print_session(ctx: &AppContext) {
    let session = ctx.controller.session();
    let stored = ctx.controller.settings().get_or_default();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Provider".bold(), stored.current_provider.display_name()]);
    table.add_row(row!["Auth server".bold(), stored.auth_server_display()]);

    let state = match session.state {
        FlowState::Authenticated => session.state.to_string().green(),
        FlowState::Failed => session.state.to_string().red(),
        _ => session.state.to_string().yellow(),
    };
    table.add_row(row!["State".bold(), state]);

    match session.token_set.as_ref() {
        Some(tokens) => {
            let expiry = match tokens.expires_in(Utc::now()) {
                Some(remaining) if remaining.num_seconds() > 0 => {
                    format!("in {}s", remaining.num_seconds()).green()
                }
                Some(_) => "expired".red(),
                None => "unknown".dimmed(),
            };
            let valid = if ctx.controller.has_valid_token() {
                "yes".green()
            } else {
                "no".red()
            };
            table.add_row(row!["Token type".bold(), tokens.token_type]);
            table.add_row(row!["Access token expires".bold(), expiry]);
            table.add_row(row!["Valid token".bold(), valid]);
            table.add_row(row!["Scope".bold(), or_dash(tokens.scope.as_deref())]);
            let yes_no = |present: bool| if present { "yes" } else { "no" };
            table.add_row(row!["Refresh token".bold(), yes_no(tokens.refresh_token.is_some())]);
            table.add_row(row!["ID token".bold(), yes_no(tokens.id_token.is_some())]);
        }
        None => {
            table.add_row(row!["Tokens".bold(), "none".dimmed()]);
        }
    }

    if let Some(message) = session.error_message.as_deref() {
        table.add_row(row!["Error".bold(), message.red()]);
    }

    println!();
    table.printstd();
    println!();
}

/// Handle `refresh`
pub async fn refresh(ctx: &AppContext) -> Result<()> {
    restore(ctx).await;
    match ctx.controller.refresh_token().await {
        Ok(tokens) => {
            let expiry = tokens
                .expires_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} New access token expires at {}", "Refreshed.".green().bold(), expiry);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Refresh failed:".red().bold(), e);
            Err(e)
        }
    }
}

/// Handle `logout`
pub async fn logout(ctx: &AppContext) -> Result<()> {
    restore(ctx).await;

    match ctx.controller.logout().await? {
        Some(url) => {
            println!("{}", "Signed out locally.".green().bold());
            println!("End the provider session at:\n{}", url.as_str().cyan());
        }
        None => println!("{}", "Signed out.".green().bold()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_binding_default_redirect() {
        let (origin, bind) = callback_binding("http://127.0.0.1:4200/auth").unwrap();
        assert_eq!(origin.as_str(), "http://127.0.0.1:4200/");
        assert_eq!(bind, "127.0.0.1:4200");
    }

    #[test]
    fn test_callback_binding_uses_scheme_default_port() {
        let (_, bind) = callback_binding("http://localhost/cb").unwrap();
        assert_eq!(bind, "localhost:80");
    }

    #[test]
    fn test_callback_binding_rejects_garbage() {
        assert!(callback_binding("not a url").is_err());
    }
}
