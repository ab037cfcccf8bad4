//! Token Session Manager - per-request identity resolution
//!
//! Owns the session lifecycle: CSRF origin check, token issuance, session
//! lookup with sliding expiry, sign-in and soft sign-out.
//!
//! Sliding expiry is a read-modify-write against the store with no lock held
//! across requests. Two concurrent requests on one token may both extend from
//! the same base and the last write wins; the session then ends slightly
//! earlier than it would have, never later.

use super::{token_prefix, TokenGenerator};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{
    ClientRequest, Clock, Identity, IdentityConfig, Session, SessionStore, SystemClock, UserRecord,
};

/// Session manager settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub app_name: String,
    pub ttl_seconds: u64,
    pub trusted_origin: String,
    pub cookie_lifetime_days: u32,
}

impl SessionOptions {
    pub fn cookie_name(&self) -> String {
        format!("{}-identity", self.app_name)
    }

    pub fn store_key(&self, token: &str) -> String {
        format!("{}-{}", self.cookie_name(), token)
    }

    fn ttl_ms(&self) -> i64 {
        (self.ttl_seconds as i64).saturating_mul(1000)
    }
}

impl From<&IdentityConfig> for SessionOptions {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            ttl_seconds: config.session_ttl_seconds,
            trusted_origin: config.trusted_origin.clone(),
            cookie_lifetime_days: config.cookie_lifetime_days,
        }
    }
}

/// Token/session lifecycle manager
///
/// Holds no per-request state; every call receives what it needs.
pub struct TokenSessionManager {
    store: Arc<dyn SessionStore>,
    tokens: TokenGenerator,
    options: SessionOptions,
    clock: Arc<dyn Clock>,
}

impl TokenSessionManager {
    /// Create a new session manager
    pub fn new(store: Arc<dyn SessionStore>, config: &IdentityConfig) -> Self {
        Self {
            store,
            tokens: TokenGenerator::new(&config.secret_key),
            options: SessionOptions::from(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry arithmetic
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// When a freshly issued identity cookie should expire
    pub fn cookie_expires_at(&self) -> DateTime<Utc> {
        let now = DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now);
        now + Duration::days(i64::from(self.options.cookie_lifetime_days))
    }

    /// Reject mutating requests whose `Origin` does not end with the trusted
    /// suffix. Safe methods pass unconditionally.
    pub fn check_origin(&self, request: &ClientRequest) -> AuthResult<()> {
        if !request.is_mutating() {
            return Ok(());
        }

        match request.origin.as_deref() {
            Some(origin) if origin.ends_with(&self.options.trusted_origin) => Ok(()),
            origin => {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    origin = ?origin,
                    "Rejected request with untrusted origin"
                );
                Err(AuthError::CsrfRejected {
                    origin: origin.map(str::to_string),
                })
            }
        }
    }

    /// Resolve the identity of a request
    ///
    /// Order matters: the origin check runs before any session lookup.
    /// A request without a token gets a new one and proceeds anonymously.
    pub async fn authenticate(&self, request: &ClientRequest) -> AuthResult<Identity> {
        self.check_origin(request)?;

        let token = match request.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                let token = self.tokens.generate(
                    &request.client_ip(),
                    request.user_agent.as_deref().unwrap_or_default(),
                )?;
                debug!(token = token_prefix(&token), "Issued new identity token");
                return Ok(Identity::anonymous(token, true));
            }
        };

        let key = self.options.store_key(token);
        let Some(mut session) = self.store.get(&key).await? else {
            debug!(token = token_prefix(token), "No session for token");
            return Ok(Identity::anonymous(token, false));
        };

        let now = self.clock.now_ms();
        if !session.is_valid_at(now) {
            debug!(
                token = token_prefix(token),
                user_id = %session.user.id,
                expires_at_ms = session.expires_at_ms,
                "Session expired"
            );
            return Ok(Identity::anonymous(token, false));
        }

        session.expires_at_ms = session.expires_at_ms.saturating_add(self.options.ttl_ms());
        if let Err(e) = self
            .store
            .set(&key, Some(&session), session.remaining_ttl_seconds(now))
            .await
        {
            // The session is still valid; only the extension was lost.
            warn!(
                token = token_prefix(token),
                error = %e,
                "Failed to persist sliding expiry"
            );
        }

        debug!(
            token = token_prefix(token),
            user_id = %session.user.id,
            expires_at_ms = session.expires_at_ms,
            "Session extended"
        );
        Ok(Identity::authenticated(token, session.user))
    }

    /// Bind `user` to `token` for one TTL
    ///
    /// The token is not rotated: the pre-authentication token becomes the
    /// authenticated one.
    pub async fn sign_in(
        &self,
        token: &str,
        mut user: UserRecord,
        client_ip: &str,
    ) -> AuthResult<Session> {
        user.set("ip", client_ip);

        let now = self.clock.now_ms();
        let session = Session::new(token, user, now.saturating_add(self.options.ttl_ms()));
        self.store
            .set(
                &self.options.store_key(token),
                Some(&session),
                session.remaining_ttl_seconds(now),
            )
            .await?;

        info!(
            token = token_prefix(token),
            user_id = %session.user.id,
            "User signed in"
        );
        Ok(session)
    }

    /// Soft-revoke the session bound to `token`
    ///
    /// Returns whether a session existed. The record stays in the store with
    /// a zero expiry until the store drops it.
    pub async fn sign_out(&self, token: &str) -> AuthResult<bool> {
        let key = self.options.store_key(token);
        let Some(mut session) = self.store.get(&key).await? else {
            return Ok(false);
        };

        session.expires_at_ms = 0;
        let now = self.clock.now_ms();
        self.store
            .set(&key, Some(&session), session.remaining_ttl_seconds(now))
            .await?;

        info!(
            token = token_prefix(token),
            user_id = %session.user.id,
            "User signed out"
        );
        Ok(true)
    }

    /// Raw session lookup, ignoring expiry
    pub async fn session(&self, token: &str) -> AuthResult<Option<Session>> {
        Ok(self.store.get(&self.options.store_key(token)).await?)
    }
}
