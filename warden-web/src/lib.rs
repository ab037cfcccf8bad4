//! Warden Web Server
//!
//! axum integration for warden: the identity cookie, the two request
//! middlewares and a small demo API guarded by the policy registry.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use server::WardenServer;
pub use state::AppState;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::trace::TraceLayer;
use warden_auth::AuthError;
use warden_core::WardenError;

/// Create the main application router
///
/// Identity resolution wraps every request; authorization runs only for
/// requests that matched a route.
pub fn create_app(state: AppState) -> Router {
    routes::api_routes()
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::authorization_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable development mode (exposes the sign-in endpoint)
    pub dev_mode: bool,
    /// Path to the warden TOML configuration
    pub config_path: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            dev_mode: false,
            config_path: None,
        }
    }
}

impl WebConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("WARDEN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("WARDEN_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(8080),
            dev_mode: std::env::var("WARDEN_DEV_MODE")
                .ok()
                .and_then(|flag| flag.parse().ok())
                .unwrap_or(false),
            config_path: std::env::var("WARDEN_CONFIG").ok(),
        }
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] WardenError),

    #[error("Authorization setup error: {0}")]
    Authorization(#[from] AuthError),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;
