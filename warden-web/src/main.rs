//! Warden Web Server
//!
//! Token sessions and route-scoped authorization in front of a small JSON API.

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{info, warn};
use warden_core::{init_logging, WardenConfig};
use warden_web::server::WardenServerBuilder;
use warden_web::WebConfig;

/// Warden Web Server - cookie sessions and role-based route authorization
#[derive(Parser)]
#[command(name = "warden-web")]
#[command(about = "Token session and authorization server")]
#[command(version)]
struct Args {
    /// Server host to bind to (overrides WARDEN_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on (overrides WARDEN_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable development mode (exposes POST /api/session)
    #[arg(long)]
    dev: bool,

    /// Warden configuration file (overrides WARDEN_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut WebConfig) -> Option<String> {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.dev_mode |= self.dev;
        if self.config.is_some() {
            config.config_path = self.config;
        }
        self.log_level
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = WebConfig::from_env();
    let log_level = args.apply(&mut config);

    let mut warden = match &config.config_path {
        Some(path) => WardenConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => WardenConfig::default(),
    };
    if let Some(level) = log_level {
        warden.logging.level = level;
    }

    init_logging(&warden.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    if config.config_path.is_none() {
        warn!("No configuration file given, running with defaults");
    }
    if config.dev_mode {
        warn!("Development mode: sign-in accepts unverified user records");
    }

    let server = WardenServerBuilder::new()
        .host(config.host.clone())
        .port(config.port)
        .dev_mode(config.dev_mode)
        .warden_config(warden)
        .build()
        .await
        .context("Failed to build server")?;

    info!("Server configured for http://{}", config.address());
    server.start().await.context("Server failed")?;

    info!("Server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["warden-web"]);
        assert!(args.host.is_none());
        assert!(args.port.is_none());
        assert!(!args.dev);

        let args = Args::parse_from([
            "warden-web",
            "--host",
            "0.0.0.0",
            "--port",
            "3000",
            "--dev",
            "--config",
            "warden.toml",
        ]);
        let mut config = WebConfig::default();
        let level = args.apply(&mut config);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.dev_mode);
        assert_eq!(config.config_path.as_deref(), Some("warden.toml"));
        assert!(level.is_none());
    }
}
