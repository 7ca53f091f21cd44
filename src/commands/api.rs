use colored::Colorize;

use crate::api::{build_url, ApiClient, ApiConfig, ApiRequest, HttpMethod};
use crate::commands::AppContext;
use crate::error::{Result, TokenProbeError};

/// Arguments of `call`.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub target: String,
    pub method: String,
    pub data: Option<String>,
    pub headers: Vec<String>,
    pub no_token: bool,
}

/// Resolves `target` to a URL: absolute URLs pass through, endpoint names
/// and paths are joined to the API base URL.
pub fn resolve_target(api: &ApiConfig, target: &str) -> String {
    if let Some(url) = api.endpoint_url(target) {
        return url;
    }
    build_url(&api.base_url, target)
}

/// Parses a `Name: value` header.
pub fn parse_header(header: &str) -> Result<(String, String)> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(TokenProbeError::Config(format!(
            "Invalid header '{}'. Expected 'Name: value'",
            header
        ))
        .into()),
    }
}

/// Handle `call`
pub async fn call(ctx: &AppContext, args: CallArgs) -> Result<()> {
    let method: HttpMethod = args.method.parse()?;
    let body = match args.data.as_deref() {
        Some(data) => Some(serde_json::from_str(data).map_err(|e| {
            TokenProbeError::Config(format!("Request body is not valid JSON: {}", e))
        })?),
        None => None,
    };
    let headers = args
        .headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<_>>()?;

    let request = ApiRequest {
        method,
        url: resolve_target(&ctx.api_config(), &args.target),
        body,
        headers,
    };

    let token = if args.no_token {
        None
    } else {
        ctx.controller.initialize_auth().await;
        let token = ctx.controller.token_set().map(|t| t.access_token);
        if token.is_none() {
            println!(
                "{}",
                "Not signed in; sending the request without a bearer token.".yellow()
            );
        }
        token
    };

    let client = ApiClient::new(ctx.http.clone());
    let response = client.make_request(&request, token.as_deref()).await?;

    let status = format!("{} {}", response.status, response.status_text);
    let status = if response.is_success() {
        status.green().bold()
    } else {
        status.red().bold()
    };
    println!("{} {}  {}", request.method.to_string().bold(), request.url, status);
    for (name, value) in &response.headers {
        println!("{}: {}", name.dimmed(), value);
    }
    println!();
    match &response.body {
        serde_json::Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    if response.status == 0 {
        return Err(TokenProbeError::HttpStatus {
            status: 0,
            body: "no response received".to_string(),
        }
        .into());
    }
    Ok(())
}
