//! Request identity extraction and the pluggable authorization collaborators

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{error, info};
use warden_auth::AuthError;
use warden_core::{AuditContext, AuditLogger, Identity, RoleValidator, UserRecord, WardenResult};

/// Identity resolved by the identity middleware
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| {
                error!("Identity middleware is not installed");
                StatusCode::INTERNAL_SERVER_ERROR
            })
    }
}

/// Client address as derived for token issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientAddress>()
            .cloned()
            .unwrap_or_else(|| ClientAddress("unknown".to_string())))
    }
}

/// HTTP rendering of an [`AuthError`]
///
/// CSRF rejections answer 400 with no body. Everything else is a server
/// fault and answers 500 without details.
#[derive(Debug)]
pub struct AuthFailure(pub AuthError);

impl From<AuthError> for AuthFailure {
    fn from(error: AuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &self.0 {
            AuthError::Core(e) => e.log(),
            other if status.is_server_error() => error!(error = %other, "Request failed"),
            _ => {}
        }
        status.into_response()
    }
}

/// Role validator reading the user record's `roles` field
///
/// Accepts a JSON array of strings or a comma-separated string.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordRoleValidator;

impl RecordRoleValidator {
    fn held_roles(user: &UserRecord) -> HashSet<&str> {
        match user.get("roles") {
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(list)) => list
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .collect(),
            _ => HashSet::new(),
        }
    }
}

#[async_trait]
impl RoleValidator for RecordRoleValidator {
    async fn validate(&self, user: &UserRecord, roles: &[String]) -> WardenResult<bool> {
        let held = Self::held_roles(user);
        Ok(roles.iter().all(|role| held.contains(role.as_str())))
    }
}

/// Audit logger emitting one event per request on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, context: AuditContext<'_>, roles: Option<&[String]>) -> WardenResult<()> {
        info!(
            target: "audit",
            method = context.method,
            url = context.url,
            route = %context.target,
            user_id = context.user.map(|user| user.id.as_str()),
            decision = context.decision,
            roles = ?roles,
            "request completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::RouteTarget;

    fn roles(list: &[&str]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    #[tokio::test]
    async fn test_record_role_validator_array() {
        let user = UserRecord::new("u1").with_field("roles", json!(["r", "o"]));
        let validator = RecordRoleValidator;

        assert!(validator.validate(&user, &roles(&["r"])).await.unwrap());
        assert!(validator.validate(&user, &roles(&["r", "o", "r"])).await.unwrap());
        assert!(!validator.validate(&user, &roles(&["admin"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_role_validator_comma_list() {
        let user = UserRecord::new("u1").with_field("roles", "admin, editor");
        let validator = RecordRoleValidator;

        assert!(validator.validate(&user, &roles(&["editor", "admin"])).await.unwrap());
        assert!(!validator.validate(&user, &roles(&["owner"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_role_validator_without_roles() {
        let validator = RecordRoleValidator;
        let user = UserRecord::new("u1");

        assert!(!validator.validate(&user, &roles(&["r"])).await.unwrap());
        assert!(validator.validate(&user, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_tracing_audit_logger_never_fails() {
        let target = RouteTarget::new("C", "add");
        let context = AuditContext {
            method: "GET",
            url: "/c/add",
            target: &target,
            user: None,
            decision: "unauthenticated",
        };
        let required = roles(&["r"]);
        assert!(TracingAuditLogger
            .log(context, Some(required.as_slice()))
            .await
            .is_ok());
        assert!(TracingAuditLogger.log(context, None).await.is_ok());
    }

    #[test]
    fn test_auth_failure_status() {
        let csrf = AuthFailure(AuthError::CsrfRejected { origin: None }).into_response();
        assert_eq!(csrf.status(), StatusCode::BAD_REQUEST);

        let unresolved = AuthFailure(AuthError::route_unresolved("GET", "/x")).into_response();
        assert_eq!(unresolved.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let store_down = warden_core::store_error!("connection refused", "sqlite_store");
        let response = AuthFailure(AuthError::Core(store_down)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
