//! HTTP request handlers for the warden web server
//!
//! Handlers run after both middlewares, so the identity is always present
//! and the route policy has already been applied.

use crate::auth::{AuthFailure, ClientAddress, CurrentIdentity};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use warden_auth::ControllerPolicy;
use warden_core::UserRecord;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: String,
}

/// Session view returned by the session endpoints
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserRecord,
    pub expires_at_ms: Option<i64>,
}

/// Sign-out response
#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub signed_out: bool,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The signed-in user and the already slid expiry
pub async fn current_session(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let Some(user) = identity.user else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state.sessions.session(&identity.token).await {
        Ok(session) => Json(SessionResponse {
            user,
            expires_at_ms: session.map(|session| session.expires_at_ms),
        })
        .into_response(),
        Err(e) => AuthFailure(e).into_response(),
    }
}

/// Bind the posted user record to the current token
///
/// Credentials are not verified, so this only exists in development mode.
pub async fn sign_in(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ClientAddress(client_ip): ClientAddress,
    payload: Result<Json<UserRecord>, JsonRejection>,
) -> Response {
    if !state.config.dev_mode {
        return StatusCode::NOT_FOUND.into_response();
    }

    let Json(user) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection.into_response(),
    };

    match state.sessions.sign_in(&identity.token, user, &client_ip).await {
        Ok(session) => Json(SessionResponse {
            user: session.user,
            expires_at_ms: Some(session.expires_at_ms),
        })
        .into_response(),
        Err(e) => AuthFailure(e).into_response(),
    }
}

/// Soft-revoke the current session
pub async fn sign_out(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<SignOutResponse>, AuthFailure> {
    let signed_out = state.sessions.sign_out(&identity.token).await?;
    Ok(Json(SignOutResponse { signed_out }))
}

/// Every registered controller policy
pub async fn list_policies(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, ControllerPolicy>> {
    Json(state.authorization.registry().snapshot())
}
