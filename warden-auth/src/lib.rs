//! Warden Auth - Token sessions and route-scoped role authorization
//!
//! This crate holds the two pieces that make authorization decisions:
//!
//! - **Sessions** ([`session`]): token issuance, resolution, sliding expiry,
//!   sign-in/sign-out and the CSRF origin check
//! - **Authorization** ([`authorization`]): the write-once policy registry and
//!   the per-request engine producing allow / unauthenticated / forbidden
//! - **Stores** ([`store`]): session store adapters
//!
//! ## Architecture
//!
//! Everything here is transport-agnostic. The web layer (warden-web) turns
//! HTTP requests into [`warden_core::ClientRequest`]s and decisions back into
//! responses.

pub mod authorization;
pub mod session;
pub mod store;

pub use authorization::{
    AuthorizationEngine, AuthorizationEngineBuilder, AuthorizationOptions, AuthorizationRequest,
    ControllerPolicy, ControllerRegistration, Decision, Outcome, PolicyLookup, PolicyRegistry,
};
pub use session::{SessionOptions, TokenGenerator, TokenSessionManager};
pub use store::MemorySessionStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteSessionStore;

use warden_core::WardenError;

/// What a registration call tried to register twice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    ClassPolicy,
    ActionPolicy,
    Anonymous,
}

impl std::fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationKind::ClassPolicy => write!(f, "class policy"),
            RegistrationKind::ActionPolicy => write!(f, "action policy"),
            RegistrationKind::Anonymous => write!(f, "anonymous marker"),
        }
    }
}

/// Authentication and authorization errors
///
/// Unauthenticated and forbidden requests are not errors; see [`Decision`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Request origin rejected")]
    CsrfRejected { origin: Option<String> },

    #[error("No controller/action resolved for {method} {path}")]
    RouteUnresolved { method: String, path: String },

    #[error("Duplicate {kind} registration for {target}")]
    DuplicateRegistration {
        target: String,
        kind: RegistrationKind,
    },

    #[error("Roles registered on {target} but no role validator was supplied")]
    MissingRoleValidator { target: String },

    #[error("Core error: {0}")]
    Core(#[from] WardenError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Create a duplicate registration error
    pub fn duplicate<S: Into<String>>(target: S, kind: RegistrationKind) -> Self {
        Self::DuplicateRegistration {
            target: target.into(),
            kind,
        }
    }

    /// Create a route resolution error
    pub fn route_unresolved<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self::RouteUnresolved {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Registration-time errors must stop the process before it serves traffic
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AuthError::DuplicateRegistration { .. } | AuthError::MissingRoleValidator { .. }
        )
    }

    /// HTTP status the transport should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::CsrfRejected { .. } => 400,
            _ => 500,
        }
    }
}
