//! Session Management Module
//!
//! Opaque bearer tokens bound to a client, resolved against a session store
//! with sliding expiry and soft revocation.

pub mod manager;
pub mod token;

pub use manager::{SessionOptions, TokenSessionManager};
pub use token::TokenGenerator;

/// First characters of a token, safe to put in logs
pub(crate) fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}
