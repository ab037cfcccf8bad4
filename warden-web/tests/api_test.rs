//! HTTP-level tests for the warden web server
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use warden_core::{ControllerPolicyConfig, WardenConfig};
use warden_web::{create_app, middleware, AppState, WebConfig};

const ORIGIN: &str = "http://localhost:8080";

fn warden_config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.identity.app_name = "shop".to_string();
    config.identity.secret_key = "test-secret".to_string();
    config
}

async fn test_state(dev_mode: bool) -> AppState {
    let config = WebConfig {
        dev_mode,
        ..WebConfig::default()
    };
    AppState::from_config(config, warden_config()).await.unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn request(method: Method, uri: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
}

/// Visit once and return the `name=value` pair of the issued cookie
async fn issue_cookie(app: &Router) -> String {
    let response = send(
        app,
        request(Method::GET, "/api/health", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("first visit sets the identity cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn sign_in(app: &Router, cookie: &str, user: Value) -> Response {
    send(
        app,
        request(Method::POST, "/api/session", Some(cookie))
            .header(header::ORIGIN, ORIGIN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(user.to_string()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_health_check_issues_cookie() {
    let app = create_app(test_state(false).await);

    let response = send(
        &app,
        request(Method::GET, "/api/health", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("shop-identity="));
    assert!(set_cookie.contains("Expires="));

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_known_cookie_is_not_reissued() {
    let app = create_app(test_state(false).await);
    let cookie = issue_cookie(&app).await;

    let response = send(
        &app,
        request(Method::GET, "/api/health", Some(&cookie))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_mutating_request_without_origin_is_rejected() {
    let app = create_app(test_state(true).await);

    let response = send(
        &app,
        request(Method::DELETE, "/api/session", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.is_empty());

    let response = send(
        &app,
        request(Method::DELETE, "/api/session", None)
            .header(header::ORIGIN, "https://evil.example.org")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_route_requires_authentication() {
    let app = create_app(test_state(false).await);

    let response = send(
        &app,
        request(Method::GET, "/api/session?tab=profile", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_text(response).await,
        "/login?redirect=/api/session?tab=profile"
    );
}

#[tokio::test]
async fn test_sign_in_requires_dev_mode() {
    let app = create_app(test_state(false).await);
    let cookie = issue_cookie(&app).await;

    let response = sign_in(&app, &cookie, json!({ "id": "u1" })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sign_in_rejects_malformed_body() {
    let app = create_app(test_state(true).await);
    let cookie = issue_cookie(&app).await;

    let response = send(
        &app,
        request(Method::POST, "/api/session", Some(&cookie))
            .header(header::ORIGIN, ORIGIN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        request(Method::POST, "/api/session", Some(&cookie))
            .header(header::ORIGIN, ORIGIN)
            .body(Body::from(json!({ "id": "u1" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_sign_in_session_and_sign_out() {
    let app = create_app(test_state(true).await);
    let cookie = issue_cookie(&app).await;

    let response = sign_in(&app, &cookie, json!({ "id": "u1", "nickname": "" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let signed_in = body_json(response).await;
    assert_eq!(signed_in["user"]["id"], "u1");
    assert_eq!(signed_in["user"]["ip"], "unknown");

    let response = send(
        &app,
        request(Method::GET, "/api/session", Some(&cookie))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let current = body_json(response).await;
    assert_eq!(current["user"]["id"], "u1");
    assert!(current["user"].get("nickname").is_none());
    let slid = current["expires_at_ms"].as_i64().unwrap();
    assert!(slid > signed_in["expires_at_ms"].as_i64().unwrap());

    let response = send(
        &app,
        request(Method::DELETE, "/api/session", Some(&cookie))
            .header(header::ORIGIN, ORIGIN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["signed_out"], true);

    let response = send(
        &app,
        request(Method::GET, "/api/session", Some(&cookie))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_policies_require_admin_role() {
    let app = create_app(test_state(true).await);

    let user_cookie = issue_cookie(&app).await;
    sign_in(&app, &user_cookie, json!({ "id": "u1", "roles": ["editor"] })).await;
    let response = send(
        &app,
        request(Method::GET, "/api/admin/policies", Some(&user_cookie))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.is_empty());

    let admin_cookie = issue_cookie(&app).await;
    sign_in(&app, &admin_cookie, json!({ "id": "root", "roles": "admin" })).await;
    let response = send(
        &app,
        request(Method::GET, "/api/admin/policies", Some(&admin_cookie))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let policies = body_json(response).await;
    assert_eq!(policies["admin"]["class_roles"], json!(["admin"]));
    assert_eq!(policies["system"]["anonymous_actions"], json!(["health"]));
}

#[tokio::test]
async fn test_configured_controllers_are_registered() {
    let mut warden = warden_config();
    warden.authorization.default_deny = true;
    warden.authorization.controllers.push(ControllerPolicyConfig {
        name: "reports".to_string(),
        anonymous: vec!["summary".to_string()],
        ..Default::default()
    });
    let state = AppState::from_config(WebConfig::default(), warden)
        .await
        .unwrap();

    let registry = state.authorization.registry();
    assert!(registry.lookup("reports", "summary").is_anonymous);
    assert!(!registry.lookup("reports", "export").is_anonymous);
}

#[tokio::test]
async fn test_unmapped_route_is_server_error() {
    let state = test_state(false).await;
    let app = Router::new()
        .route("/api/unmapped", get(|| async { "reached" }))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::authorization_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .with_state(state);

    let response = send(
        &app,
        request(Method::GET, "/api/unmapped", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
