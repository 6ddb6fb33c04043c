//! Cryptographic utilities
//!
//! Secure generation of client tokens and identifiers, and hashing of
//! provider key secrets.

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Generate a client bearer token: 256 bits of uniform randomness, hex
/// encoded (64 chars). High entropy makes plain lookup safe.
pub fn generate_client_token() -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;
    Ok(hex::encode(bytes))
}

/// Generate a client id from a display name: lowercased slug plus a short
/// random suffix, e.g. "claude-code-9f3ab1".
pub fn generate_client_id(name: &str) -> Result<String> {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "client" } else { slug };

    let rng = SystemRandom::new();
    let mut bytes = [0u8; 3];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;
    Ok(format!("{}-{}", slug, hex::encode(bytes)))
}

/// Generate a provider API secret in the gateway's own format:
/// `ms-{base64url(32 bytes)}`. Used when the gateway mints secrets for
/// testing or local providers.
pub fn generate_api_secret() -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;
    Ok(format!("ms-{}", URL_SAFE_NO_PAD.encode(bytes)))
}

/// Stable hash of a key secret (SHA-256 hex). This is an identity for
/// looking up the in-memory plaintext, not a password hash; secrets are
/// high-entropy so a fast hash is the right tool.
pub fn hash_key_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Display prefix for a secret: first 8 chars, or the whole thing if
/// shorter.
pub fn key_prefix(secret: &str) -> String {
    secret.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_client_token() {
        let token = generate_client_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        // Two draws should never collide
        assert_ne!(token, generate_client_token().unwrap());
    }

    #[test]
    fn test_generate_client_id_slugs_name() {
        let id = generate_client_id("Claude Code").unwrap();
        assert!(id.starts_with("claude-code-"));
        assert_eq!(id.len(), "claude-code-".len() + 6);

        let id = generate_client_id("///").unwrap();
        assert!(id.starts_with("client-"));
    }

    #[test]
    fn test_generate_api_secret() {
        let secret = generate_api_secret().unwrap();
        assert!(secret.starts_with("ms-"));
        assert_eq!(secret.len(), 46); // "ms-" + 43 base64 chars
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_key_secret("sk-test-1");
        let b = hash_key_secret("sk-test-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_key_secret("sk-test-2"));
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("sk-abcdefgh"), "sk-abcde");
        assert_eq!(key_prefix("sk"), "sk");
    }
}
