pub mod config;
pub mod proxy;

pub use proxy::{
    encode_varint, read_handshake_frame, read_varint, BackendAddress, DirectoryResolver,
    HandshakeError, HandshakeFrame, Listener, ListenerConfig, ProxyProtocolV1, ResolveError,
    SessionError,
};
