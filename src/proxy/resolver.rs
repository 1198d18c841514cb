//! Virtual host resolution against the directory service.
//!
//! The directory service exposes the full hostname-to-backend mapping as a
//! single JSON object at `/service/mapping`. Keys are either `"host:port"`
//! or bare `"host"`; values carry the concrete backend address. The mapping
//! is fetched fresh on every connection; any caching lives server-side.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Timeout for a single directory request.
const DIRECTORY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors produced while resolving a virtual host.
///
/// Both variants are terminal for the connection attempt; there is no retry.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither `"host:port"` nor `"host"` is present in the mapping.
    #[error("no mapping for {host}:{port}")]
    UnresolvedHost { host: String, port: u16 },

    /// The directory service call itself failed (transport, status, or
    /// decode error).
    #[error("directory service request failed: {0}")]
    DirectoryUnavailable(#[from] reqwest::Error),
}

/// Concrete backend address resolved for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress {
    /// Backend host (IP or resolvable hostname).
    pub host: String,
    /// Backend port.
    pub port: u16,
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One entry of the directory mapping.
#[derive(Debug, Deserialize)]
struct MappingEntry {
    address: String,
    port: u16,
}

/// Client for the external directory service.
pub struct DirectoryResolver {
    base_url: String,
    client: reqwest::Client,
}

impl DirectoryResolver {
    /// Create a resolver for the given directory base URL.
    ///
    /// The access token is attached as a bearer `Authorization` header on
    /// every mapping request.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let raw = token.trim();
        let bearer = if raw.starts_with("Bearer ") || raw.starts_with("bearer ") {
            raw.to_string()
        } else {
            format!("Bearer {raw}")
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).context("Invalid directory token format")?,
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("mcrouter/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(DIRECTORY_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build directory HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Resolve a virtual host to a concrete backend address.
    ///
    /// Looks up the composite key `"{host}:{port}"` first, falling back to
    /// the bare key `"{host}"`.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<BackendAddress, ResolveError> {
        let url = format!("{}/service/mapping", self.base_url);

        let mappings: HashMap<String, MappingEntry> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(mapping_count = mappings.len(), "Directory mapping fetched");

        let entry = mappings
            .get(&format!("{host}:{port}"))
            .or_else(|| mappings.get(host))
            .ok_or_else(|| ResolveError::UnresolvedHost {
                host: host.to_string(),
                port,
            })?;

        Ok(BackendAddress {
            host: entry.address.clone(),
            port: entry.port,
        })
    }
}
