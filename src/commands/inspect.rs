use colored::Colorize;
use prettytable::{format, row, Table};

use crate::auth::jwt::{self, TokenInspection};
use crate::commands::{or_dash, AppContext};
use crate::error::{Result, TokenProbeError};

/// Which token `inspect` shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Literal(String),
    Access,
    Id,
}

impl TokenSource {
    /// `--access` is the default when neither a token nor `--id` is given.
    pub fn from_args(token: Option<String>, access: bool, id: bool) -> Self {
        match token {
            Some(token) => TokenSource::Literal(token),
            None if access => TokenSource::Access,
            None if id => TokenSource::Id,
            None => TokenSource::Access,
        }
    }
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        or_dash(None)
    } else {
        values.join(", ")
    }
}

fn claims_table(inspection: &TokenInspection) -> Table {
    let payload_str = |name: &str| {
        inspection
            .payload
            .get(name)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    };

    let expired = match inspection.is_expired {
        Some(true) => "yes".red(),
        Some(false) => "no".green(),
        None => "-".dimmed(),
    };
    let remaining = inspection
        .time_until_expiry_ms
        .map(|ms| format!("{}s", ms / 1000));

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Claim".bold(), "Value".bold()]);
    table.add_row(row!["Algorithm", or_dash(inspection.header.alg.as_deref())]);
    table.add_row(row!["Key ID", or_dash(inspection.header.kid.as_deref())]);
    table.add_row(row!["Issuer", or_dash(payload_str("iss").as_deref())]);
    table.add_row(row!["Audience", or_dash(payload_str("aud").as_deref())]);
    table.add_row(row!["Subject / user", or_dash(inspection.user_id.as_deref())]);
    table.add_row(row!["Tenant", or_dash(inspection.tenant_id.as_deref())]);
    table.add_row(row!["Name", or_dash(inspection.display_name.as_deref())]);
    table.add_row(row!["UPN", or_dash(inspection.user_principal_name.as_deref())]);
    table.add_row(row!["Email", or_dash(inspection.email.as_deref())]);
    table.add_row(row!["Issued at", or_dash(inspection.issued_at.as_deref())]);
    table.add_row(row!["Not before", or_dash(inspection.not_before.as_deref())]);
    table.add_row(row!["Expires at", or_dash(inspection.expires_at.as_deref())]);
    table.add_row(row!["Expired", expired]);
    table.add_row(row!["Time left", or_dash(remaining.as_deref())]);
    table.add_row(row!["Scopes", join_or_dash(&inspection.scopes)]);
    table.add_row(row!["Roles", join_or_dash(&inspection.roles)]);
    table.add_row(row!["Groups", join_or_dash(&inspection.groups)]);
    table
}

/// Handle `inspect`
pub async fn inspect(ctx: &AppContext, source: TokenSource) -> Result<()> {
    let want_id = source == TokenSource::Id;
    let token = match source {
        TokenSource::Literal(token) => token,
        TokenSource::Access | TokenSource::Id => {
            ctx.controller.initialize_auth().await;
            let tokens = ctx.controller.token_set().ok_or_else(|| {
                TokenProbeError::Config("Not signed in. Run `tokenprobe login` first.".to_string())
            })?;
            if want_id {
                tokens.id_token.ok_or_else(|| {
                    TokenProbeError::Config("The session has no ID token".to_string())
                })?
            } else {
                tokens.access_token
            }
        }
    };

    let Some(inspection) = jwt::inspect(token.trim()) else {
        println!(
            "{}",
            "Not a decodable JWT (the token may be opaque).".yellow()
        );
        return Ok(());
    };

    println!();
    claims_table(&inspection).printstd();

    println!("\n{}", "Header".bold());
    println!("{}", serde_json::to_string_pretty(&inspection.header)?);
    println!("\n{}", "Payload".bold());
    println!("{}", serde_json::to_string_pretty(&inspection.payload)?);
    println!();
    Ok(())
}

/// Handle `compare`
pub fn compare(token_a: &str, token_b: &str) -> Result<()> {
    let comparison = match jwt::compare(token_a.trim(), token_b.trim()) {
        Ok(comparison) => comparison,
        Err(e) => {
            println!("{}", e.error.red());
            return Ok(());
        }
    };

    let a = &comparison.a;
    let b = &comparison.b;
    let claim = |inspection: &TokenInspection, name: &str| {
        inspection
            .payload
            .get(name)
            .map(|v| v.to_string().trim_matches('"').to_string())
    };
    let mark = |differs: bool| {
        if differs {
            "differs".red()
        } else {
            "same".green()
        }
    };
    let diff = &comparison.differences;

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Claim".bold(), "Token A".bold(), "Token B".bold(), "".bold()]);
    table.add_row(row![
        "Issuer",
        or_dash(claim(a, "iss").as_deref()),
        or_dash(claim(b, "iss").as_deref()),
        mark(diff.issuer)
    ]);
    table.add_row(row![
        "Audience",
        or_dash(claim(a, "aud").as_deref()),
        or_dash(claim(b, "aud").as_deref()),
        mark(diff.audience)
    ]);
    table.add_row(row![
        "Scopes",
        join_or_dash(&a.scopes),
        join_or_dash(&b.scopes),
        mark(diff.scopes)
    ]);
    table.add_row(row![
        "Roles",
        join_or_dash(&a.roles),
        join_or_dash(&b.roles),
        mark(diff.roles)
    ]);
    table.add_row(row![
        "User",
        or_dash(a.user_id.as_deref()),
        or_dash(b.user_id.as_deref()),
        mark(diff.user_id)
    ]);
    table.add_row(row![
        "Tenant",
        or_dash(a.tenant_id.as_deref()),
        or_dash(b.tenant_id.as_deref()),
        mark(diff.tenant_id)
    ]);

    println!();
    table.printstd();
    if diff.is_identical() {
        println!("{}", "No differences in compared claims.".green());
    }
    println!();
    Ok(())
}
