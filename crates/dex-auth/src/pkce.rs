//! PKCE (Proof Key for Code Exchange) helpers.
//!
//! Implements the S256 method from RFC 7636 §4.2.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy in a code verifier.
pub const VERIFIER_BYTES: usize = 32;

/// Bytes of entropy in the anti-CSRF `state`.
pub const STATE_BYTES: usize = 16;

/// Generate `byte_length` cryptographically random bytes, base64url-encoded without padding.
pub fn random_token(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Generate a PKCE code verifier.
pub fn generate_code_verifier() -> String {
    random_token(VERIFIER_BYTES)
}

/// Generate an OAuth `state` parameter.
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// Compute the S256 code challenge: `BASE64URL(SHA256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
