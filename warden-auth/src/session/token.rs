//! Token derivation
//!
//! A token is `base64(HMAC-SHA256(secret, "{ip}:{user_agent}:{nonce}"))`.
//! Without the secret the output is indistinguishable from random, so tokens
//! cannot be guessed or forged from the visible client attributes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use warden_core::{ErrorContext, WardenError, WardenResult};

type HmacSha256 = Hmac<Sha256>;

/// Keyed token generator
#[derive(Clone)]
pub struct TokenGenerator {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenGenerator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Generate a fresh token for a client using an OS-random nonce
    pub fn generate(&self, client_ip: &str, user_agent: &str) -> WardenResult<String> {
        self.derive(client_ip, user_agent, OsRng.next_u64())
    }

    /// Deterministic derivation for a given nonce
    pub fn derive(&self, client_ip: &str, user_agent: &str, nonce: u64) -> WardenResult<String> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.secret).map_err(|e| WardenError::Token {
                message: format!("HMAC initialization failed: {}", e),
                context: ErrorContext::new("token").with_operation("derive"),
            })?;
        mac.update(format!("{}:{}:{}", client_ip, user_agent, nonce).as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic_per_secret() {
        let generator = TokenGenerator::new("secret");
        let a = generator.derive("1.2.3.4", "curl", 42).unwrap();
        let b = generator.derive("1.2.3.4", "curl", 42).unwrap();
        assert_eq!(a, b);

        let other = TokenGenerator::new("other-secret");
        assert_ne!(a, other.derive("1.2.3.4", "curl", 42).unwrap());
    }

    #[test]
    fn test_token_is_base64_sha256_digest() {
        let token = TokenGenerator::new("secret")
            .derive("1.2.3.4", "curl", 1)
            .unwrap();
        let raw = STANDARD.decode(&token).unwrap();
        assert_eq!(raw.len(), 32);
        assert!(!token.contains("1.2.3.4"));
    }

    #[test]
    fn test_generate_uses_fresh_nonce() {
        let generator = TokenGenerator::new("secret");
        let a = generator.generate("1.2.3.4", "curl").unwrap();
        let b = generator.generate("1.2.3.4", "curl").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", TokenGenerator::new("hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
