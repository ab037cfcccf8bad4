//! Application state: session manager, authorization engine and route table

use crate::{auth::RecordRoleValidator, auth::TracingAuditLogger, routes, WebConfig, WebResult};
use std::sync::Arc;
use tracing::{info, warn};
use warden_auth::{
    AuthResult, AuthorizationEngine, AuthorizationOptions, MemorySessionStore, PolicyRegistry,
    TokenSessionManager,
};
use warden_core::{SessionStore, StoreBackend, WardenConfig, WardenResult};

#[cfg(feature = "sqlite")]
use warden_auth::SqliteSessionStore;

const NO_ROLES: [&str; 0] = [];

/// Concrete session store behind the manager
#[derive(Debug, Clone)]
pub enum SessionBackend {
    Memory(MemorySessionStore),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteSessionStore),
}

impl SessionBackend {
    /// Open the store selected by configuration
    pub async fn open(config: &WardenConfig) -> WardenResult<Self> {
        match config.store.backend {
            StoreBackend::Memory => Ok(Self::Memory(MemorySessionStore::new())),
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite => {
                let url = config.store.database_url.as_deref().unwrap_or("sqlite::memory:");
                Ok(Self::Sqlite(SqliteSessionStore::connect(url).await?))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite => {
                warn!("SQLite support not compiled in, using the in-memory session store");
                Ok(Self::Memory(MemorySessionStore::new()))
            }
        }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Drop entries whose store TTL has elapsed
    pub async fn purge_expired(&self) -> WardenResult<u64> {
        match self {
            Self::Memory(store) => Ok(store.purge_expired().await as u64),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.purge_expired().await,
        }
    }
}

/// Policies of the built-in API, registered before the configured ones
pub fn register_builtin_policies(registry: &mut PolicyRegistry) -> AuthResult<()> {
    registry.controller("system").allow_anonymous("health")?;
    registry
        .controller("session")
        .action("current", NO_ROLES)?
        .allow_anonymous("sign_in")?
        .allow_anonymous("sign_out")?;
    registry.controller("admin").authorize(["admin"])?;
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: WebConfig,
    /// Warden configuration
    pub warden: Arc<WardenConfig>,
    pub backend: SessionBackend,
    pub sessions: Arc<TokenSessionManager>,
    pub authorization: Arc<AuthorizationEngine>,
    pub routes: Arc<routes::RouteTable>,
}

impl AppState {
    /// Create application state from the configured warden file, or the
    /// defaults when none is set
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let warden = match &config.config_path {
            Some(path) => WardenConfig::from_file(path)?,
            None => {
                warn!("No warden configuration given, using defaults");
                WardenConfig::default()
            }
        };
        Self::from_config(config, warden).await
    }

    /// Create application state from an explicit warden configuration
    ///
    /// Fails on invalid configuration and on any policy registration error,
    /// so a misconfigured server never starts serving.
    pub async fn from_config(config: WebConfig, warden: WardenConfig) -> WebResult<Self> {
        warden.validate()?;
        let backend = SessionBackend::open(&warden).await?;

        let sessions = TokenSessionManager::new(backend.store(), &warden.identity);

        let mut builder = AuthorizationEngine::builder(AuthorizationOptions::from(
            &warden.authorization,
        ))
        .role_validator(Arc::new(RecordRoleValidator))
        .audit_logger(Arc::new(TracingAuditLogger))
        .default_deny(warden.authorization.default_deny);
        register_builtin_policies(builder.registry_mut())?;
        let authorization = builder
            .register_all(&warden.authorization.controllers)?
            .build();

        info!(
            app = %warden.identity.app_name,
            controllers = authorization.registry().len(),
            "Application state initialized"
        );

        Ok(Self {
            config,
            warden: Arc::new(warden),
            backend,
            sessions: Arc::new(sessions),
            authorization: Arc::new(authorization),
            routes: Arc::new(routes::api_route_table()),
        })
    }

    /// Periodic store maintenance
    pub async fn cleanup_expired_sessions(&self) {
        match self.backend.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} expired sessions", purged),
            Err(e) => e.log(),
        }
    }
}
