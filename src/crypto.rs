//! Hashing for bearer API keys.
//!
//! Keys are only ever stored as a domain-separated SHA-256 digest; the
//! plaintext is shown once at creation time.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix on every generated API key, so leaked keys are recognisable.
pub const API_KEY_PREFIX: &str = "bl_key_";

/// Generate a new high-entropy API key.
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, Uuid::new_v4().as_simple())
}

/// One-way hash of a secret for storage and lookup.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"bizlist-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
