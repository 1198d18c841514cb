//! mcrouter
//!
//! Minecraft-aware TCP router.
//!
//! This service:
//! - Accepts TCP connections on the conventional Minecraft port
//! - Reads the handshake frame to learn the intended virtual host
//! - Resolves the virtual host through an external directory service
//! - Prepends a PROXY protocol v1 header and replays the exact handshake
//! - Relays the connection to the resolved backend

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcrouter::config::Config;
use mcrouter::proxy::{DirectoryResolver, Listener, ListenerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to MCROUTER_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting mcrouter");
    info!(
        directory_url = %config.directory_url,
        bind_addr = %config.bind_addr,
        "Configuration loaded"
    );

    let resolver = Arc::new(DirectoryResolver::new(
        &config.directory_url,
        &config.directory_token,
    )?);

    let listener = Listener::bind(ListenerConfig::new(config.bind_addr), resolver).await?;
    let listener = Arc::new(listener);

    // On shutdown signal the process exits immediately: accepting stops and
    // in-flight sessions are force-closed when the runtime drops.
    tokio::select! {
        result = Arc::clone(&listener).run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing listener");
        }
    }

    Ok(())
}
