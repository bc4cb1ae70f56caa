//! Hashing and signing primitives for API keys, request payloads, and
//! outbound webhooks.
//!
//! Secrets are never stored in plaintext: API keys are looked up by salted
//! SHA-256 hash. Outbound webhook bodies are signed with HMAC-SHA256 so
//! merchants can verify authenticity.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Hash a secret for database lookups (API keys).
/// Uses SHA-256 with application salt, returns lowercase hex string.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"paybridge-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash an arbitrary byte payload, returns lowercase hex string.
/// Used for idempotency request fingerprints (no salt: the hash is compared
/// only against hashes produced the same way, never used as a credential).
pub fn hash_payload(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Generate a merchant API key with `pb_live_` prefix.
pub fn generate_api_key() -> String {
    format!(
        "pb_live_{}{}",
        Uuid::new_v4().as_simple(),
        Uuid::new_v4().as_simple()
    )
}

/// Sign a webhook body with HMAC-SHA256, returns lowercase hex string.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison for shared-secret tokens.
///
/// An attacker could otherwise measure response times to progressively
/// discover the correct token byte-by-byte. Length is not secret.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
