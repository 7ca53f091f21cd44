//! PKCE (RFC 7636) and anti-CSRF random values
//!
//! The verifier is 32 random bytes in base64url without padding; the
//! challenge is `BASE64URL(SHA256(verifier))`. The same random source backs
//! the `state` and `nonce` values persisted before each redirect.

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

use crate::auth::discovery::DiscoveryDocument;

/// The only challenge method this client sends.
pub const S256: &str = "S256";

/// A verifier and the challenge derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Sent as `code_verifier` on the token request
    pub verifier: String,
    /// Sent as `code_challenge` on the authorization request
    pub challenge: String,
    /// Always [`S256`]
    pub method: String,
}

/// Generates a fresh S256 challenge pair.
///
/// # Examples
///
/// ```
/// use tokenprobe::auth::pkce::{challenge_for, generate};
///
/// let pkce = generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge, challenge_for(&pkce.verifier));
/// ```
pub fn generate() -> PkceChallenge {
    let verifier = random_token(32);
    let challenge = challenge_for(&verifier);
    PkceChallenge {
        verifier,
        challenge,
        method: S256.to_string(),
    }
}

/// Computes the S256 challenge for `verifier`.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// `len` random bytes encoded as base64url without padding.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether the discovery document advertises S256.
///
/// Many Keycloak realms omit `code_challenge_methods_supported` even though
/// they accept PKCE, so an absent list counts as supported. Only an explicit
/// list without `S256` returns false.
pub fn advertises_s256(document: &DiscoveryDocument) -> bool {
    match document.code_challenge_methods_supported.as_deref() {
        None => true,
        Some(methods) => methods.iter().any(|m| m == S256),
    }
}
