//! PROXY protocol v1 header generation.
//!
//! The header is a single ASCII line prepended to the backend connection so
//! the backend can attribute the session to the real client address despite
//! the proxy hop.
//!
//! Wire format (from the HAProxy PROXY protocol spec, v1 text form):
//! `PROXY TCP4 <src-ip> <dst-ip> <src-port> <dst-port>\r\n`
//!
//! Only the `TCP4` form is emitted; there is no IPv6 variant here.

use std::io;
use std::net::{IpAddr, SocketAddr};

use super::resolver::BackendAddress;

/// PROXY protocol v1 header for one proxied connection.
#[derive(Debug, Clone)]
pub struct ProxyProtocolV1 {
    /// Original client source address and port.
    pub src_addr: SocketAddr,
    /// Resolved backend host (as returned by the directory).
    pub backend_host: String,
    /// Resolved backend port.
    pub backend_port: u16,
}

impl ProxyProtocolV1 {
    /// Create a new PROXY v1 header for the given connection.
    pub fn new(src_addr: SocketAddr, backend: &BackendAddress) -> Self {
        Self {
            src_addr,
            backend_host: backend.host.clone(),
            backend_port: backend.port,
        }
    }

    /// Generate the header line.
    ///
    /// Must be written to the backend socket in full before any payload
    /// bytes. Fails with `InvalidInput` for a non-IPv4 client address, since
    /// only the `TCP4` form is supported.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let src_ip = match self.src_addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "PROXY v1 TCP4 header requires an IPv4 client address",
                ))
            }
        };

        Ok(format!(
            "PROXY TCP4 {} {} {} {}\r\n",
            src_ip,
            self.backend_host,
            self.src_addr.port(),
            self.backend_port
        )
        .into_bytes())
    }
}
