//! PKCE (Proof Key for Code Exchange) helpers.
//!
//! Implements S256 verifier generation and challenge derivation per RFC 7636.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Metadata key the verifier is stored under.
pub const VERIFIER_KEY: &str = "code_verifier";

/// Challenge method advertised in the authorization URL.
pub const METHOD_S256: &str = "S256";

/// Generate a code verifier: 64 unreserved characters from two UUIDv4s.
pub fn generate_verifier() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Compute `BASE64URL(SHA256(code_verifier))`.
pub fn challenge_s256(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Verify a PKCE S256 code challenge.
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    challenge_s256(code_verifier) == code_challenge
}
