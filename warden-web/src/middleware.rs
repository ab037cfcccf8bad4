//! Warden Web Middleware
//!
//! `identity_middleware` resolves the session of every request and issues the
//! identity cookie; `authorization_middleware` applies the policy of the
//! matched route.

use crate::auth::{AuthFailure, ClientAddress};
use crate::AppState;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tracing::{debug, warn};
use warden_auth::{AuthError, AuthorizationRequest, Outcome};
use warden_core::{ClientRequest, Identity};

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Proxy-supplied client address: `X-Real-IP`, then the first
/// `X-Forwarded-For` entry
///
/// Only meaningful behind a reverse proxy that overwrites these headers.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let real_ip = header_str(headers, X_REAL_IP).map(str::trim);
    let forwarded_for = || {
        header_str(headers, X_FORWARDED_FOR)
            .and_then(|list| list.split(',').next())
            .map(str::trim)
    };

    real_ip
        .filter(|ip| !ip.is_empty())
        .or_else(|| forwarded_for().filter(|ip| !ip.is_empty()))
        .map(str::to_string)
}

/// Percent-decoded identity token from the request cookies
pub fn identity_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(cookie_name)?;
    urlencoding::decode(cookie.value())
        .map(|token| token.into_owned())
        .ok()
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value carrying a freshly issued token
pub fn identity_cookie(
    cookie_name: &str,
    token: &str,
    expires: DateTime<Utc>,
) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; Expires={}; HttpOnly",
        cookie_name,
        urlencoding::encode(token),
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    HeaderValue::from_str(&cookie).ok()
}

fn request_url(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

/// Transport-independent view of `request`
pub fn client_request(request: &Request, cookie_name: &str) -> ClientRequest {
    let headers = request.headers();
    let mut client = ClientRequest::new(request.method().as_str(), request_url(request));

    if let Some(origin) = header_str(headers, header::ORIGIN.as_str()) {
        client = client.with_origin(origin);
    }
    if let Some(user_agent) = header_str(headers, header::USER_AGENT.as_str()) {
        client = client.with_user_agent(user_agent);
    }
    if let Some(ip) = forwarded_ip(headers) {
        client = client.with_forwarded_ip(ip);
    }
    if let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        client = client.with_peer_ip(peer.ip());
    }
    if let Some(token) = identity_token(headers, cookie_name) {
        client = client.with_token(token);
    }

    client
}

/// Resolve the request identity and attach it to the request extensions
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.sessions.options().cookie_name();
    let client = client_request(&request, &cookie_name);

    let identity = match state.sessions.authenticate(&client).await {
        Ok(identity) => identity,
        Err(e) => return AuthFailure(e).into_response(),
    };

    let issued_cookie = if identity.issued {
        let cookie = identity_cookie(
            &cookie_name,
            &identity.token,
            state.sessions.cookie_expires_at(),
        );
        if cookie.is_none() {
            warn!("Issued token does not fit in a cookie header");
        }
        cookie
    } else {
        None
    };

    request
        .extensions_mut()
        .insert(ClientAddress(client.client_ip()));
    request.extensions_mut().insert(identity);

    let mut response = next.run(request).await;
    if let Some(cookie) = issued_cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Authorize the matched route and run the handler when allowed
pub async fn authorization_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let target = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|path| state.routes.resolve(&method, path.as_str()))
        .cloned();

    let mut auth_request = AuthorizationRequest::new(method.as_str(), request_url(&request));
    if let Some(target) = target {
        auth_request = auth_request.with_target(target);
    }
    if let Some(identity) = request.extensions().get::<Identity>() {
        auth_request = auth_request.with_identity(identity);
    }

    let outcome = state
        .authorization
        .authorize(&auth_request, || async move {
            Ok::<_, AuthError>(next.run(request).await)
        })
        .await;

    match outcome {
        Ok(Outcome::Completed(response)) => response,
        Ok(Outcome::Unauthenticated { redirect }) => {
            debug!(url = %auth_request.url, "Authentication required");
            (StatusCode::UNAUTHORIZED, redirect).into_response()
        }
        Ok(Outcome::Forbidden) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => AuthFailure(e).into_response(),
    }
}
