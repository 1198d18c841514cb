//! Router configuration (env-driven).
//!
//! Configuration is loaded once at startup and passed by reference into the
//! resolver and listener; there is no ambient global lookup. Missing
//! required values are fatal before any connection is accepted.

use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Conventional Minecraft listen address.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:25565";

/// Router configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory service base URL (example: http://localhost:8080).
    pub directory_url: String,

    /// Access token for the directory service.
    pub directory_token: String,

    /// Address the proxy listens on.
    pub bind_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let directory_url = std::env::var("MCROUTER_API_URL")
            .context("Missing directory service URL. Set MCROUTER_API_URL.")?;

        let directory_token = std::env::var("MCROUTER_API_TOKEN")
            .context("Missing directory service token. Set MCROUTER_API_TOKEN.")?;

        let bind_addr = std::env::var("MCROUTER_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("MCROUTER_BIND must be a socket address (host:port).")?;

        let log_level = std::env::var("MCROUTER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            directory_url,
            directory_token,
            bind_addr,
            log_level,
        })
    }
}
