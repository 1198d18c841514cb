//! Minecraft-aware L4 TCP proxy.
//!
//! This module provides:
//! - Handshake frame parsing (with byte-exact replay)
//! - Virtual host resolution via the directory service
//! - PROXY protocol v1 injection
//! - Bidirectional connection relaying
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Handshake Reader -> Directory Resolver -> Backend
//!                                                   |
//!                                     PROXY v1 header + raw handshake replay
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use mcrouter::proxy::{DirectoryResolver, Listener, ListenerConfig};
//!
//! let resolver = Arc::new(DirectoryResolver::new("http://directory:8080", token)?);
//! let listener = Listener::bind(ListenerConfig::new("0.0.0.0:25565".parse()?), resolver).await?;
//! Arc::new(listener).run().await?;
//! ```

mod handshake;
mod listener;
mod proxy_protocol;
mod resolver;

pub use handshake::{
    encode_varint, read_handshake_frame, read_varint, HandshakeError, HandshakeFrame,
    MAX_SERVER_ADDRESS_LEN, MAX_VARINT_BYTES,
};
pub use listener::{
    Listener, ListenerConfig, SessionError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT,
};
pub use proxy_protocol::ProxyProtocolV1;
pub use resolver::{BackendAddress, DirectoryResolver, ResolveError};
