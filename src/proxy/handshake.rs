//! Minecraft handshake frame parsing.
//!
//! This module reads the first packet a client sends (the handshake frame)
//! to extract the virtual host and port for routing decisions. Every byte
//! consumed while parsing is preserved verbatim so the orchestrator can
//! replay the exact frame to the backend: the backend's own protocol
//! implementation must see nothing different from a direct connection.
//!
//! Wire format (all integers VarInt-encoded unless noted):
//! - packet length
//! - packet id (0x00 = handshake)
//! - protocol version
//! - server address length, then that many UTF-8 bytes
//! - port (2 bytes, big-endian u16)
//! - next state

use std::string::FromUtf8Error;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// VarInt payload bits per byte.
const SEGMENT_BITS: u8 = 0x7F;

/// High bit signals another VarInt byte follows.
const CONTINUE_BIT: u8 = 0x80;

/// A VarInt never exceeds 5 bytes (32-bit bound).
pub const MAX_VARINT_BYTES: usize = 5;

/// Packet id of the handshake frame.
const HANDSHAKE_PACKET_ID: u32 = 0;

/// The protocol caps the server address at 255 characters; anything longer
/// is rejected before allocating.
pub const MAX_SERVER_ADDRESS_LEN: u32 = 255;

/// Errors produced while reading a handshake frame.
///
/// All variants are fatal to the frame-read attempt: bytes already consumed
/// are not returned to the stream.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// VarInt continuation bit still set after 5 bytes.
    #[error("malformed varint: exceeds {MAX_VARINT_BYTES}-byte bound")]
    MalformedVarint,

    /// First packet was not a handshake.
    #[error("unexpected packet id {0} (expected {HANDSHAKE_PACKET_ID})")]
    UnexpectedPacketType(u32),

    /// Server address bytes are not valid UTF-8.
    #[error("server address is not valid UTF-8")]
    InvalidEncoding(#[from] FromUtf8Error),

    /// Declared server address length exceeds the protocol cap.
    #[error("server address length {0} exceeds {MAX_SERVER_ADDRESS_LEN}")]
    AddressTooLong(u32),

    /// Peer disconnected or errored mid-frame.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed handshake frame.
///
/// Produced once per connection; the raw bytes it was decoded from travel
/// alongside it for byte-exact replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFrame {
    /// Protocol version the client speaks.
    pub protocol_version: u32,
    /// Virtual host the client intends to reach.
    pub server_address: String,
    /// Port the client intends to reach.
    pub port: u16,
}

/// Read one VarInt from the stream, one byte at a time.
///
/// Returns the decoded value and the exact bytes consumed. Fails with
/// [`HandshakeError::MalformedVarint`] if the continuation bit is still set
/// after [`MAX_VARINT_BYTES`] bytes.
pub async fn read_varint<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<(u32, Vec<u8>), HandshakeError> {
    let mut value: u32 = 0;
    let mut raw = Vec::with_capacity(MAX_VARINT_BYTES);

    for i in 0..MAX_VARINT_BYTES {
        let byte = stream.read_u8().await?;
        raw.push(byte);

        value |= u32::from(byte & SEGMENT_BITS) << (7 * i as u32);

        if byte & CONTINUE_BIT == 0 {
            return Ok((value, raw));
        }
    }

    Err(HandshakeError::MalformedVarint)
}

/// Encode a value as a VarInt.
pub fn encode_varint(mut value: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_BYTES);
    while value > u32::from(SEGMENT_BITS) {
        buf.push((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
    buf.push(value as u8);
    buf
}

/// Consume exactly one handshake frame from a freshly accepted connection.
///
/// Returns the structured frame and the verbatim bytes read, in read order.
/// The raw bytes must be forwarded to the backend unmodified; re-encoding
/// the frame is not byte-stable (VarInts admit redundant encodings).
pub async fn read_handshake_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<(HandshakeFrame, Vec<u8>), HandshakeError> {
    let mut raw = Vec::new();

    // Packet length: consumed for replay, not validated against the actual
    // frame (the frame is parsed field-by-field instead).
    let (_packet_len, bytes) = read_varint(stream).await?;
    raw.extend_from_slice(&bytes);

    let (packet_id, bytes) = read_varint(stream).await?;
    raw.extend_from_slice(&bytes);
    if packet_id != HANDSHAKE_PACKET_ID {
        return Err(HandshakeError::UnexpectedPacketType(packet_id));
    }

    let (protocol_version, bytes) = read_varint(stream).await?;
    raw.extend_from_slice(&bytes);

    let (address_len, bytes) = read_varint(stream).await?;
    raw.extend_from_slice(&bytes);
    if address_len > MAX_SERVER_ADDRESS_LEN {
        return Err(HandshakeError::AddressTooLong(address_len));
    }

    let mut address_buf = vec![0u8; address_len as usize];
    stream.read_exact(&mut address_buf).await?;
    raw.extend_from_slice(&address_buf);
    let server_address = String::from_utf8(address_buf)?;

    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    raw.extend_from_slice(&port_buf);
    let port = u16::from_be_bytes(port_buf);

    // Next state (1 = status, 2 = login): unused for routing, but consumed
    // so it is part of the replayed bytes.
    let (_next_state, bytes) = read_varint(stream).await?;
    raw.extend_from_slice(&bytes);

    Ok((
        HandshakeFrame {
            protocol_version,
            server_address,
            port,
        },
        raw,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a well-formed handshake frame on the wire.
    fn make_frame(protocol_version: u32, address: &[u8], port: u16, next_state: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&encode_varint(HANDSHAKE_PACKET_ID));
        body.extend_from_slice(&encode_varint(protocol_version));
        body.extend_from_slice(&encode_varint(address.len() as u32));
        body.extend_from_slice(address);
        body.extend_from_slice(&port.to_be_bytes());
        body.extend_from_slice(&encode_varint(next_state));

        let mut frame = encode_varint(body.len() as u32);
        frame.extend_from_slice(&body);
        frame
    }

    #[tokio::test]
    async fn test_varint_roundtrip() {
        let values = [
            0u32,
            1,
            127,
            128,
            255,
            300,
            25565,
            2_097_151,
            2_147_483_647,
        ];

        for value in values {
            let encoded = encode_varint(value);
            let mut stream: &[u8] = &encoded;
            let (decoded, raw) = read_varint(&mut stream).await.unwrap();
            assert_eq!(decoded, value);
            assert_eq!(raw, encoded);

            // Decoding the returned raw bytes again yields the same value.
            let mut again: &[u8] = &raw;
            let (redecoded, _) = read_varint(&mut again).await.unwrap();
            assert_eq!(redecoded, value);
        }
    }

    #[tokio::test]
    async fn test_varint_rejects_overlong_encoding() {
        let mut stream: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        match read_varint(&mut stream).await {
            Err(HandshakeError::MalformedVarint) => {}
            other => panic!("Expected MalformedVarint, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_varint_eof() {
        let mut stream: &[u8] = &[0x80];
        match read_varint(&mut stream).await {
            Err(HandshakeError::Io(_)) => {}
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_handshake_frame() {
        let wire = make_frame(763, b"play.example.com", 25565, 2);
        let mut stream: &[u8] = &wire;

        let (frame, raw) = read_handshake_frame(&mut stream).await.unwrap();

        assert_eq!(frame.protocol_version, 763);
        assert_eq!(frame.server_address, "play.example.com");
        assert_eq!(frame.port, 25565);

        // Byte-exact replay contract: raw equals what was fed in.
        assert_eq!(raw, wire);
        assert!(stream.is_empty(), "frame reader consumed extra bytes");
    }

    #[tokio::test]
    async fn test_wrong_packet_id_stops_at_id() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_varint(16)); // claimed length
        wire.extend_from_slice(&encode_varint(1)); // status request, not handshake
        wire.extend_from_slice(&encode_varint(763));

        let mut stream: &[u8] = &wire;
        match read_handshake_frame(&mut stream).await {
            Err(HandshakeError::UnexpectedPacketType(1)) => {}
            other => panic!("Expected UnexpectedPacketType(1), got {:?}", other),
        }

        // Nothing past the id varint was consumed.
        assert_eq!(stream, &encode_varint(763)[..]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_address() {
        let wire = make_frame(763, &[0xff, 0xfe, 0xfd], 25565, 2);
        let mut stream: &[u8] = &wire;
        match read_handshake_frame(&mut stream).await {
            Err(HandshakeError::InvalidEncoding(_)) => {}
            other => panic!("Expected InvalidEncoding, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_address_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_varint(10));
        wire.extend_from_slice(&encode_varint(HANDSHAKE_PACKET_ID));
        wire.extend_from_slice(&encode_varint(763));
        wire.extend_from_slice(&encode_varint(100_000)); // absurd address length

        let mut stream: &[u8] = &wire;
        match read_handshake_frame(&mut stream).await {
            Err(HandshakeError::AddressTooLong(100_000)) => {}
            other => panic!("Expected AddressTooLong, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let wire = make_frame(763, b"play.example.com", 25565, 2);
        let mut stream: &[u8] = &wire[..wire.len() / 2];
        match read_handshake_frame(&mut stream).await {
            Err(HandshakeError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("Expected Io, got {:?}", other),
        }
    }
}
