//! Authorization response parsing and the loopback callback receiver
//!
//! A callback is any URL carrying `code` or `error` in its query string. In
//! a browser host the page simply reloads at that URL; the CLI host instead
//! listens on the redirect URI's loopback port and hands the received URL to
//! the flow controller.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::error::{Result, TokenProbeError};

/// Query parameters that belong to an authorization response.
const RESPONSE_PARAMS: &[&str] = &[
    "code",
    "state",
    "session_state",
    "error",
    "error_description",
    "error_uri",
    "iss",
];

/// What the authorization server sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    Code {
        code: String,
        state: Option<String>,
        session_state: Option<String>,
    },
    Error {
        error: String,
        description: String,
    },
}

impl AuthorizationResponse {
    /// Parses the query string of `url`. Returns `None` when neither `code`
    /// nor `error` is present. `error` takes precedence over `code`.
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use tokenprobe::auth::callback::AuthorizationResponse;
    ///
    /// let url = Url::parse("http://localhost:4200/auth?error=access_denied&error_description=User+cancelled").unwrap();
    /// assert_eq!(
    ///     AuthorizationResponse::from_url(&url),
    ///     Some(AuthorizationResponse::Error {
    ///         error: "access_denied".to_string(),
    ///         description: "User cancelled".to_string(),
    ///     })
    /// );
    /// ```
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut code = None;
        let mut state = None;
        let mut session_state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "session_state" => session_state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Some(AuthorizationResponse::Error {
                error,
                description: description.unwrap_or_default(),
            });
        }

        code.filter(|c| !c.is_empty())
            .map(|code| AuthorizationResponse::Code {
                code,
                state,
                session_state,
            })
    }
}

/// Returns `url` without authorization response parameters. Other query
/// parameters are kept; an empty query is dropped entirely.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tokenprobe::auth::callback::strip_authorization_params;
///
/// let url = Url::parse("http://localhost:4200/auth?code=ABC&state=S1&tab=tokens").unwrap();
/// assert_eq!(strip_authorization_params(&url).as_str(), "http://localhost:4200/auth?tab=tokens");
/// ```
pub fn strip_authorization_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !RESPONSE_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}

// ---------------------------------------------------------------------------
// Loopback receiver
// ---------------------------------------------------------------------------

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>TokenProbe</title></head>\
<body><h1>Authorization response received</h1>\
<p>You can close this tab and return to the terminal.</p></body></html>";

/// Accepts connections on `listener` until one carries an authorization
/// response, and returns that request's URL resolved against `origin`.
///
/// Requests without `code` or `error` (favicon probes, for instance) get a
/// 404 and are ignored.
///
/// # Errors
///
/// Returns `TokenProbeError::Callback` if accepting or reading a connection
/// fails.
pub async fn receive_callback(listener: TcpListener, origin: &Url) -> Result<Url> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| TokenProbeError::Callback(format!("failed to accept connection: {e}")))?;
        tracing::debug!(%peer, "Callback connection accepted");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let mut request_line = String::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| TokenProbeError::Callback(format!("failed to read request: {e}")))?
        {
            if line.is_empty() {
                break;
            }
            if request_line.is_empty() {
                request_line = line;
            }
        }

        // "GET /auth?code=...&state=... HTTP/1.1"
        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let url = origin.join(target)?;

        if AuthorizationResponse::from_url(&url).is_some() {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                SUCCESS_PAGE.len(),
                SUCCESS_PAGE
            );
            let _ = write_half.write_all(response.as_bytes()).await;
            let _ = write_half.shutdown().await;
            return Ok(url);
        }

        let _ = write_half
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
        let _ = write_half.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_response_with_state() {
        let url = Url::parse("http://localhost:4200/auth?code=ABC&state=S1&session_state=xyz").unwrap();
        assert_eq!(
            AuthorizationResponse::from_url(&url),
            Some(AuthorizationResponse::Code {
                code: "ABC".to_string(),
                state: Some("S1".to_string()),
                session_state: Some("xyz".to_string()),
            })
        );
    }

    #[test]
    fn test_error_wins_over_code() {
        let url = Url::parse("http://localhost/auth?code=ABC&error=server_error").unwrap();
        assert!(matches!(
            AuthorizationResponse::from_url(&url),
            Some(AuthorizationResponse::Error { ref error, ref description })
                if error == "server_error" && description.is_empty()
        ));
    }

    #[test]
    fn test_plain_url_is_not_a_callback() {
        let url = Url::parse("http://localhost:4200/auth?tab=1").unwrap();
        assert!(AuthorizationResponse::from_url(&url).is_none());
        let empty_code = Url::parse("http://localhost:4200/auth?code=").unwrap();
        assert!(AuthorizationResponse::from_url(&empty_code).is_none());
    }

    #[test]
    fn test_strip_removes_query_entirely() {
        let url = Url::parse("http://localhost:4200/auth?code=ABC&state=S1").unwrap();
        assert_eq!(
            strip_authorization_params(&url).as_str(),
            "http://localhost:4200/auth"
        );
    }

    #[tokio::test]
    async fn test_receive_callback_skips_unrelated_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let origin = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();

        let server = tokio::spawn(async move { receive_callback(listener, &origin).await });

        let mut favicon = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        favicon
            .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut favicon, &mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 404"));

        let mut callback = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        callback
            .write_all(b"GET /auth?code=ABC&state=S1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut callback, &mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 200"));

        let url = server.await.unwrap().unwrap();
        assert_eq!(url.path(), "/auth");
        assert_eq!(url.query(), Some("code=ABC&state=S1"));
    }
}
