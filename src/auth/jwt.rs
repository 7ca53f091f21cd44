//! JWT decoding and claim inspection
//!
//! Tokens are parsed for display only. Signatures are carried through as an
//! opaque string and never verified. Every entry point returns `None` (or a
//! [`ComparisonError`]) on malformed input instead of propagating an error.

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// JOSE header fields the inspector cares about. Unknown fields are kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The three parts of a compact JWT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedToken {
    pub header: JwtHeader,
    pub payload: Map<String, Value>,
    /// Third segment, untouched.
    pub signature: String,
}

impl DecodedToken {
    /// Looks up a string claim.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    /// Looks up a numeric claim (integer or float seconds).
    pub fn claim_f64(&self, name: &str) -> Option<f64> {
        self.payload.get(name).and_then(Value::as_f64)
    }
}

/// Decodes a compact JWT into header, payload and signature.
///
/// Returns `None` unless the token has exactly three dot-separated segments
/// whose first two decode (base64url, padding optional) to JSON objects.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::jwt::decode;
///
/// // {"alg":"none"} . {"sub":"42"} . sig
/// let token = "eyJhbGciOiJub25lIn0.eyJzdWIiOiI0MiJ9.sig";
/// let decoded = decode(token).unwrap();
/// assert_eq!(decoded.header.alg.as_deref(), Some("none"));
/// assert_eq!(decoded.claim_str("sub"), Some("42"));
/// assert_eq!(decoded.signature, "sig");
///
/// assert!(decode("not-a-token").is_none());
/// ```
pub fn decode(token: &str) -> Option<DecodedToken> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(segments = parts.len(), "Rejecting token with wrong segment count");
        return None;
    }

    let header_json = base64url_decode(parts[0])?;
    let payload_json = base64url_decode(parts[1])?;

    let header: JwtHeader = serde_json::from_str(&header_json).ok()?;
    let payload: Map<String, Value> = serde_json::from_str(&payload_json).ok()?;

    Some(DecodedToken {
        header,
        payload,
        signature: parts[2].to_string(),
    })
}

/// Decodes one base64url segment to a UTF-8 string.
///
/// Converts to the standard alphabet and pads to a multiple of four before
/// decoding, so both padded and unpadded input are accepted.
fn base64url_decode(segment: &str) -> Option<String> {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(standard.as_bytes())
        .ok()?;
    String::from_utf8(bytes).ok()
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// A decoded token enriched with human-readable derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInspection {
    pub header: JwtHeader,
    pub payload: Map<String, Value>,
    /// `iat` as an ISO-8601 UTC timestamp with millisecond precision
    pub issued_at: Option<String>,
    /// `exp` as an ISO-8601 UTC timestamp
    pub expires_at: Option<String>,
    /// `nbf` as an ISO-8601 UTC timestamp
    pub not_before: Option<String>,
    /// `None` when the token has no `exp` claim
    pub is_expired: Option<bool>,
    /// Milliseconds left before `exp`, floored at zero
    pub time_until_expiry_ms: Option<i64>,
    /// Entra `tid`
    pub tenant_id: Option<String>,
    /// `oid`, falling back to `sub`
    pub user_id: Option<String>,
    pub user_principal_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Space-delimited `scp` split into individual scopes
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

/// Inspects `token` against the current clock.
pub fn inspect(token: &str) -> Option<TokenInspection> {
    inspect_at(token, Utc::now())
}

/// Inspects `token` as if the current time were `now`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tokenprobe::auth::jwt::inspect_at;
///
/// // payload {"exp":1700000000,"scp":"read write"}
/// let token = "eyJhbGciOiJub25lIn0.eyJleHAiOjE3MDAwMDAwMDAsInNjcCI6InJlYWQgd3JpdGUifQ.x";
/// let now = Utc.timestamp_opt(1_699_999_990, 0).unwrap();
/// let info = inspect_at(token, now).unwrap();
///
/// assert_eq!(info.is_expired, Some(false));
/// assert_eq!(info.time_until_expiry_ms, Some(10_000));
/// assert_eq!(info.expires_at.as_deref(), Some("2023-11-14T22:13:20.000Z"));
/// assert_eq!(info.scopes, vec!["read", "write"]);
/// ```
pub fn inspect_at(token: &str, now: DateTime<Utc>) -> Option<TokenInspection> {
    let decoded = decode(token)?;
    let now_ms = now.timestamp_millis();

    let exp_ms = decoded.claim_f64("exp").map(seconds_to_millis);
    let is_expired = exp_ms.map(|exp| now_ms > exp);
    let time_until_expiry_ms = exp_ms.map(|exp| exp.saturating_sub(now_ms).max(0));

    let scopes = decoded
        .claim_str("scp")
        .map(|scp| scp.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let user_id = decoded
        .claim_str("oid")
        .or_else(|| decoded.claim_str("sub"))
        .map(str::to_string);

    Some(TokenInspection {
        issued_at: timestamp_claim(&decoded, "iat"),
        expires_at: timestamp_claim(&decoded, "exp"),
        not_before: timestamp_claim(&decoded, "nbf"),
        is_expired,
        time_until_expiry_ms,
        tenant_id: decoded.claim_str("tid").map(str::to_string),
        user_id,
        user_principal_name: decoded.claim_str("upn").map(str::to_string),
        display_name: decoded.claim_str("name").map(str::to_string),
        email: decoded.claim_str("email").map(str::to_string),
        scopes,
        roles: string_array_claim(&decoded, "roles"),
        groups: string_array_claim(&decoded, "groups"),
        header: decoded.header,
        payload: decoded.payload,
    })
}

/// Converts claim seconds to milliseconds. Non-finite and out-of-range
/// values saturate at the `i64` bounds.
fn seconds_to_millis(seconds: f64) -> i64 {
    let millis = seconds * 1000.0;
    if millis.is_nan() {
        0
    } else {
        millis.clamp(i64::MIN as f64, i64::MAX as f64) as i64
    }
}

fn timestamp_claim(decoded: &DecodedToken, name: &str) -> Option<String> {
    let millis = seconds_to_millis(decoded.claim_f64(name)?);
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn string_array_claim(decoded: &DecodedToken, name: &str) -> Vec<String> {
    decoded
        .payload
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Which claims differ between two tokens. `true` means "different".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDifferences {
    pub issuer: bool,
    pub audience: bool,
    pub scopes: bool,
    pub roles: bool,
    pub user_id: bool,
    pub tenant_id: bool,
}

impl ClaimDifferences {
    /// True when no compared field differs.
    pub fn is_identical(&self) -> bool {
        *self == ClaimDifferences::default()
    }
}

/// Side-by-side inspection of two tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenComparison {
    pub a: TokenInspection,
    pub b: TokenInspection,
    pub differences: ClaimDifferences,
}

/// Returned by [`compare`] when either token cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonError {
    pub error: String,
}

impl std::fmt::Display for ComparisonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for ComparisonError {}

/// Compares issuer, audience, scopes, roles, user id and tenant id of two
/// tokens using structural equality.
///
/// # Errors
///
/// Returns a [`ComparisonError`] if either token fails to decode.
pub fn compare(token_a: &str, token_b: &str) -> Result<TokenComparison, ComparisonError> {
    let (Some(a), Some(b)) = (inspect(token_a), inspect(token_b)) else {
        return Err(ComparisonError {
            error: "Failed to decode one or both tokens".to_string(),
        });
    };

    let differences = ClaimDifferences {
        issuer: a.payload.get("iss") != b.payload.get("iss"),
        audience: a.payload.get("aud") != b.payload.get("aud"),
        scopes: a.scopes != b.scopes,
        roles: a.roles != b.roles,
        user_id: a.user_id != b.user_id,
        tenant_id: a.tenant_id != b.tenant_id,
    };

    Ok(TokenComparison { a, b, differences })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_token(header: Value, payload: Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.signature",
            engine.encode(header.to_string()),
            engine.encode(payload.to_string())
        )
    }

    fn entra_token() -> String {
        make_token(
            json!({"alg": "RS256", "typ": "JWT", "kid": "key-1"}),
            json!({
                "iss": "https://login.microsoftonline.com/tenant/v2.0",
                "aud": "api://app",
                "iat": 1_700_000_000,
                "nbf": 1_700_000_000,
                "exp": 1_700_003_600,
                "tid": "tenant",
                "oid": "object-id",
                "sub": "subject",
                "upn": "dev@example.com",
                "name": "Dev User",
                "scp": "User.Read  Mail.Send",
                "roles": ["Admin", "Reader"],
                "groups": ["g1"]
            }),
        )
    }

    #[test]
    fn test_decode_reads_header_payload_and_signature() {
        let decoded = decode(&entra_token()).unwrap();
        assert_eq!(decoded.header.alg.as_deref(), Some("RS256"));
        assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
        assert_eq!(decoded.claim_str("tid"), Some("tenant"));
        assert_eq!(decoded.signature, "signature");
    }

    #[test]
    fn test_decode_returns_encoded_header_and_payload_unchanged() {
        let cases = [
            (
                json!({"alg": "RS256", "typ": "JWT", "kid": "k1", "x5t": "thumb"}),
                json!({"sub": "42", "exp": 1_700_000_000, "ratio": 0.25, "neg": -7}),
            ),
            (
                json!({"alg": "none", "cty": "JWT", "crit": ["exp"], "jwk": {"kty": "RSA", "e": "AQAB"}}),
                json!({
                    "name": "Zoë Ångström 名前",
                    "emoji": "🔐",
                    "address": {"street": {"line1": "1 Main St"}, "zip": null},
                    "groups": ["a", "b", ["nested"]],
                    "flags": [true, false],
                    "empty": {}
                }),
            ),
            (json!({}), json!({})),
        ];

        for (header, payload) in cases {
            let decoded = decode(&make_token(header.clone(), payload.clone())).unwrap();
            assert_eq!(serde_json::to_value(&decoded.header).unwrap(), header);
            assert_eq!(Value::Object(decoded.payload), payload);
            assert_eq!(decoded.signature, "signature");
        }
    }

    #[test]
    fn test_inspect_survives_extreme_timestamps() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for value in [-1e19, 1e19, -1e300, 1e300, i64::MIN as f64, i64::MAX as f64] {
            let token = make_token(
                json!({"alg": "none"}),
                json!({"exp": value, "iat": value, "nbf": value}),
            );
            let info = inspect_at(&token, now).unwrap();
            let remaining = info.time_until_expiry_ms.unwrap();
            assert!(remaining >= 0);
            assert_eq!(info.is_expired, Some(value < 0.0));
            assert!(info.expires_at.is_none());
            assert!(info.issued_at.is_none());
            assert!(info.not_before.is_none());
        }

        let token = make_token(json!({"alg": "none"}), json!({"exp": -1e19}));
        assert!(compare(&token, &token).unwrap().differences.is_identical());
    }

    #[test]
    fn test_decode_accepts_padded_segments() {
        let engine = base64::engine::general_purpose::URL_SAFE;
        let token = format!(
            "{}.{}.s",
            engine.encode(r#"{"alg":"none"}"#),
            engine.encode(r#"{"sub":"a"}"#)
        );
        assert!(decode(&token).is_some());
    }

    #[test]
    fn test_decode_keeps_unknown_header_fields() {
        let token = make_token(json!({"alg": "RS256", "cty": "JWT"}), json!({}));
        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.header.extra.get("cty"), Some(&json!("JWT")));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode("").is_none());
        assert!(decode("a.b").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("!!!.???.sig").is_none());

        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let not_json = format!("{}.{}.s", engine.encode("nope"), engine.encode("{}"));
        assert!(decode(&not_json).is_none());

        let array_payload = format!("{}.{}.s", engine.encode("{}"), engine.encode("[1,2]"));
        assert!(decode(&array_payload).is_none());
    }

    #[test]
    fn test_inspect_derives_entra_fields() {
        let now = Utc.timestamp_opt(1_700_000_600, 0).unwrap();
        let info = inspect_at(&entra_token(), now).unwrap();

        assert_eq!(info.issued_at.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(info.expires_at.as_deref(), Some("2023-11-14T23:13:20.000Z"));
        assert_eq!(info.not_before, info.issued_at);
        assert_eq!(info.is_expired, Some(false));
        assert_eq!(info.time_until_expiry_ms, Some(3_000_000));
        assert_eq!(info.tenant_id.as_deref(), Some("tenant"));
        assert_eq!(info.user_id.as_deref(), Some("object-id"));
        assert_eq!(info.user_principal_name.as_deref(), Some("dev@example.com"));
        assert_eq!(info.display_name.as_deref(), Some("Dev User"));
        assert_eq!(info.scopes, vec!["User.Read", "Mail.Send"]);
        assert_eq!(info.roles, vec!["Admin", "Reader"]);
        assert_eq!(info.groups, vec!["g1"]);
    }

    #[test]
    fn test_inspect_expired_token_floors_remaining_time() {
        let now = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let info = inspect_at(&entra_token(), now).unwrap();
        assert_eq!(info.is_expired, Some(true));
        assert_eq!(info.time_until_expiry_ms, Some(0));
    }

    #[test]
    fn test_inspect_without_exp_or_optional_claims() {
        let token = make_token(json!({"alg": "none"}), json!({"sub": "only-sub"}));
        let info = inspect(&token).unwrap();
        assert_eq!(info.is_expired, None);
        assert_eq!(info.time_until_expiry_ms, None);
        assert_eq!(info.expires_at, None);
        assert_eq!(info.user_id.as_deref(), Some("only-sub"));
        assert!(info.scopes.is_empty());
        assert!(info.roles.is_empty());
        assert!(info.groups.is_empty());
        assert!(info.tenant_id.is_none());
    }

    #[test]
    fn test_compare_token_with_itself_has_no_differences() {
        let token = entra_token();
        let comparison = compare(&token, &token).unwrap();
        assert!(comparison.differences.is_identical());
    }

    #[test]
    fn test_compare_reports_changed_claims() {
        let other = make_token(
            json!({"alg": "RS256"}),
            json!({
                "iss": "https://login.microsoftonline.com/tenant/v2.0",
                "aud": ["api://app"],
                "tid": "tenant",
                "oid": "someone-else",
                "scp": "User.Read Mail.Send",
                "roles": ["Reader", "Admin"]
            }),
        );
        let diff = compare(&entra_token(), &other).unwrap().differences;
        assert!(!diff.issuer);
        assert!(diff.audience);
        assert!(!diff.scopes);
        assert!(diff.roles);
        assert!(diff.user_id);
        assert!(!diff.tenant_id);
    }

    #[test]
    fn test_compare_fails_when_either_token_is_malformed() {
        let err = compare(&entra_token(), "garbage").unwrap_err();
        assert_eq!(err.error, "Failed to decode one or both tokens");
    }
}
