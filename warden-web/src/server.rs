//! Warden Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use warden_core::WardenConfig;

/// How often the session store is swept for expired entries
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Main warden web server
pub struct WardenServer {
    config: WebConfig,
    state: AppState,
}

impl WardenServer {
    /// Create a new server, loading the warden configuration from
    /// `config.config_path`
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Create a new server from an already loaded warden configuration
    pub async fn with_warden_config(config: WebConfig, warden: WardenConfig) -> WebResult<Self> {
        let state = AppState::from_config(config.clone(), warden).await?;
        Ok(Self { config, state })
    }

    /// Start the web server
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();

        info!("Starting warden web server");
        info!("Server address: http://{}", address);
        info!("Development mode: {}", self.config.dev_mode);

        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("Server listening on http://{}", address);

        // Sweep expired sessions the store has not dropped by itself
        let cleanup_state = self.state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                cleanup_state.cleanup_expired_sessions().await;
            }
        });

        // Peer addresses feed token derivation when no proxy header is present
        if let Err(e) = serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!("Server error: {}", e);
            return Err(WebError::Server(e));
        }

        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Builder for WardenServer
pub struct WardenServerBuilder {
    config: WebConfig,
    warden: Option<WardenConfig>,
}

impl WardenServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            warden: None,
        }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Enable development mode
    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.config.dev_mode = dev_mode;
        self
    }

    /// Set the warden configuration file
    pub fn config_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// Use an already loaded warden configuration instead of a file
    pub fn warden_config(mut self, warden: WardenConfig) -> Self {
        self.warden = Some(warden);
        self
    }

    /// Build the server
    pub async fn build(self) -> WebResult<WardenServer> {
        match self.warden {
            Some(warden) => WardenServer::with_warden_config(self.config, warden).await,
            None => WardenServer::new(self.config).await,
        }
    }
}

impl Default for WardenServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
