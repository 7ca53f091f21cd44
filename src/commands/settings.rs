use colored::Colorize;
use prettytable::{format, row, Table};

use crate::api::ApiConfig;
use crate::auth::provider::{
    is_usable, resolve, EndpointOverrides, EntraConfig, KeycloakConfig, ProviderConfig,
    ProviderKind,
};
use crate::auth::settings::NOT_SET;
use crate::cli::ConfigureTarget;
use crate::commands::{or_dash, AppContext};
use crate::error::{Result, TokenProbeError};

/// Builds the provider settings described by a `configure` target.
pub fn provider_config_from(target: &ConfigureTarget) -> Option<ProviderConfig> {
    match target.clone() {
        ConfigureTarget::Keycloak {
            issuer,
            client_id,
            redirect_uri,
            scope,
            pkce,
        } => Some(ProviderConfig::Keycloak(KeycloakConfig {
            issuer,
            client_id,
            redirect_uri,
            scope,
            use_pkce: Some(pkce),
        })),
        ConfigureTarget::Entra {
            tenant_id,
            client_id,
            authority,
            redirect_uri,
            scope,
            no_pkce,
            use_discovery,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            logout_endpoint,
        } => Some(ProviderConfig::Entra(EntraConfig {
            tenant_id,
            client_id,
            authority,
            redirect_uri,
            scope,
            use_pkce: Some(!no_pkce),
            endpoints: EndpointOverrides {
                authorization_endpoint,
                token_endpoint,
                userinfo_endpoint,
                logout_endpoint,
            },
            use_discovery,
            ..Default::default()
        })),
        ConfigureTarget::Api { .. } => None,
    }
}

/// Parses `Name=/path` endpoint definitions.
fn parse_endpoint(spec: &str) -> Result<(String, String)> {
    match spec.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), path.trim().to_string()))
        }
        _ => Err(TokenProbeError::Config(format!(
            "Invalid endpoint '{}'. Expected Name=/path",
            spec
        ))
        .into()),
    }
}

/// Handle `configure`
pub fn configure(ctx: &AppContext, target: ConfigureTarget) -> Result<()> {
    let settings = ctx.controller.settings();

    if let ConfigureTarget::Api {
        base_url,
        endpoints,
    } = &target
    {
        let mut api: ApiConfig = ctx.api_config();
        if let Some(base_url) = base_url {
            url::Url::parse(base_url).map_err(|e| {
                TokenProbeError::Config(format!("Invalid base URL {}: {}", base_url, e))
            })?;
            api.base_url = base_url.clone();
        }
        for spec in endpoints {
            let (name, path) = parse_endpoint(spec)?;
            api.endpoints.insert(name, path);
        }
        settings.save_api_config(api)?;
        println!("{}", "API settings saved.".green());
        return Ok(());
    }

    let Some(config) = provider_config_from(&target) else {
        return Ok(());
    };

    settings.save_provider_config(&config)?;
    let name = config.kind().display_name();

    if ctx.controller.configure(&config) {
        println!("{} settings saved and selected.", name.green().bold());
    } else {
        println!("{} settings saved and selected.", name.bold());
        if let Some(message) = ctx.controller.error_message() {
            println!("{} {}", "Warning:".yellow().bold(), message);
        }
    }
    Ok(())
}

/// Handle `use <provider>`
pub fn use_provider(ctx: &AppContext, provider: &str) -> Result<()> {
    let kind: ProviderKind = provider.parse()?;
    let settings = ctx.controller.settings();
    settings.set_current_provider(kind)?;

    println!("Current provider: {}", kind.display_name().green().bold());
    if !settings.has_oauth_config() {
        println!(
            "{}",
            format!(
                "{} is not configured yet. Run `tokenprobe configure {}`.",
                kind.display_name(),
                kind
            )
            .yellow()
        );
    }
    Ok(())
}

/// Handle `show-config`
pub fn show_config(ctx: &AppContext) -> Result<()> {
    let stored = ctx.controller.settings().get_or_default();
    let current = stored.current();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Setting".bold(), "Value".bold()]);
    table.add_row(row![
        "Provider",
        stored.current_provider.display_name().cyan()
    ]);
    table.add_row(row!["Auth server", stored.auth_server_display()]);
    table.add_row(row!["Client ID", stored.client_id_display()]);

    match current.as_ref() {
        Some(config) => {
            let origin = url::Url::parse(&ctx.config.auth.callback_origin())
                .map_err(|e| TokenProbeError::Config(format!("Invalid callback origin: {}", e)))?;
            match resolve(config, &origin) {
                Ok(params) => {
                    table.add_row(row!["Redirect URI", params.redirect_uri]);
                    table.add_row(row!["Scope", params.scope]);
                    let pkce = if params.use_pkce { "S256" } else { "off" };
                    let discovery = if params.bypasses_discovery() {
                        "bypassed (explicit endpoints)".to_string()
                    } else {
                        params.discovery_url()
                    };
                    table.add_row(row!["PKCE", pkce]);
                    table.add_row(row!["Discovery", discovery]);
                }
                Err(_) => {
                    table.add_row(row!["Status", "incomplete".yellow()]);
                }
            }
            let usable = if is_usable(config) {
                "yes".green()
            } else {
                "no".red()
            };
            table.add_row(row!["Usable", usable]);
        }
        None => {
            table.add_row(row!["Status", NOT_SET.yellow()]);
        }
    }

    let api = ctx.api_config();
    table.add_row(row!["API base URL", api.base_url]);
    for (name, path) in &api.endpoints {
        table.add_row(row![format!("  {}", name), or_dash(Some(path))]);
    }

    println!();
    table.printstd();
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("Users=/api/users").unwrap(),
            ("Users".to_string(), "/api/users".to_string())
        );
        assert!(parse_endpoint("missing-path").is_err());
        assert!(parse_endpoint("=/x").is_err());
    }

    #[test]
    fn test_entra_target_maps_flags() {
        let target = ConfigureTarget::Entra {
            tenant_id: "contoso".to_string(),
            client_id: "app".to_string(),
            authority: None,
            redirect_uri: None,
            scope: None,
            no_pkce: true,
            use_discovery: false,
            authorization_endpoint: None,
            token_endpoint: Some("https://t".to_string()),
            userinfo_endpoint: None,
            logout_endpoint: None,
        };

        match provider_config_from(&target) {
            Some(ProviderConfig::Entra(c)) => {
                assert_eq!(c.use_pkce, Some(false));
                assert_eq!(c.endpoints.token_endpoint.as_deref(), Some("https://t"));
                assert!(c.skip_issuer_check);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
