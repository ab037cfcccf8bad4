//! Core trait definitions for the external collaborators

use crate::error::WardenResult;
use crate::types::*;
use async_trait::async_trait;

/// Durable token → session mapping with TTL
///
/// Keys arrive already namespaced (`{app}-identity-{token}`). Physical expiry
/// is the store's business; warden only ever reads, writes and removes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist `session` under `key`. A `None` session only refreshes the TTL
    /// of an existing entry. `ttl_seconds == 0` leaves the TTL unchanged.
    async fn set(&self, key: &str, session: Option<&Session>, ttl_seconds: u64)
        -> WardenResult<()>;

    async fn get(&self, key: &str) -> WardenResult<Option<Session>>;

    async fn remove(&self, key: &str) -> WardenResult<()>;
}

/// Role membership check
#[async_trait]
pub trait RoleValidator: Send + Sync {
    /// True iff `user` holds every role in `roles`.
    async fn validate(&self, user: &UserRecord, roles: &[String]) -> WardenResult<bool>;
}

/// What a completed request looks like to the audit sink
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub target: &'a RouteTarget,
    pub user: Option<&'a UserRecord>,
    /// `allowed`, `unauthenticated` or `forbidden`
    pub decision: &'a str,
}

/// Post-decision request logging
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// `roles` is `None` when the action was anonymous and roles were never
    /// evaluated.
    async fn log(&self, context: AuditContext<'_>, roles: Option<&[String]>)
        -> WardenResult<()>;
}

/// Source of the current time in Unix epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
