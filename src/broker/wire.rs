//! Wire framing for peer connections
//!
//! Every message crossing a peer socket is one length-delimited frame with a
//! fixed-size header:
//!
//! ```text
//! ┌───────────────┬──────────────────┬──────────────────┬──────────────────┬─────────────────┐
//! │ Magic (2 B)   │ Version (4 bytes)│ Type (4 bytes)   │ Length (4 bytes) │ Payload         │
//! │ "ST"          │ Big-endian u32   │ Big-endian u32   │ Big-endian u32   │ Length bytes    │
//! └───────────────┴──────────────────┴──────────────────┴──────────────────┴─────────────────┘
//! ```
//!
//! - **Magic**: fixed marker identifying the protocol
//! - **Version**: must equal [`PROTOCOL_VERSION`] or the frame is rejected
//! - **Type**: `0` = Data, `1` = Disconnection; anything above is rejected
//! - **Length**: payload byte count, capped at 1 MiB
//! - **Payload**: opaque to the broker, interpreted by the host application
//!
//! Any header violation is treated by the caller as connection loss for that
//! peer; it never affects other peers or the process.

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Protocol marker at the start of every frame
pub const MAGIC: [u8; 2] = *b"ST";

/// Protocol version spoken by this broker
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the fixed frame header (magic + version + type + length)
pub const HEADER_LEN: usize = 2 + 4 + 4 + 4;

/// Maximum accepted payload length (DoS protection)
pub const MAX_PAYLOAD_LEN: u32 = 1024 * 1024;

/// Message type carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Application payload for the host
    Data,
    /// The peer is gone; payload is empty
    Disconnection,
}

impl MessageType {
    /// Decode the wire value; values above the known range are rejected
    pub fn from_wire(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(MessageType::Data),
            1 => Ok(MessageType::Disconnection),
            other => Err(Error::UnsupportedMessageType(other)),
        }
    }

    /// Wire value of this message type
    pub fn to_wire(self) -> u32 {
        match self {
            MessageType::Data => 0,
            MessageType::Disconnection => 1,
        }
    }
}

/// Parsed fixed-size frame header
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub payload_len: u32,
}

/// One decoded frame (header already validated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

/// Decode and validate a frame header
pub fn decode_header(buf: &[u8; HEADER_LEN]) -> Result<FrameHeader> {
    let magic = [buf[0], buf[1]];
    if magic != MAGIC {
        return Err(Error::BadMagic {
            expected: MAGIC,
            actual: magic,
        });
    }

    let version = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
    if version != PROTOCOL_VERSION {
        return Err(Error::VersionMismatch {
            remote: version,
            local: PROTOCOL_VERSION,
        });
    }

    let message_type = MessageType::from_wire(u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]))?;

    let payload_len = u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]);
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::FrameTooLarge {
            size: payload_len,
            limit: MAX_PAYLOAD_LEN,
        });
    }

    Ok(FrameHeader {
        message_type,
        payload_len,
    })
}

/// Encode a complete frame (header + payload) into a byte buffer
pub fn encode_frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.extend_from_slice(&message_type.to_wire().to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Read one complete frame from the stream
///
/// Blocks until a full frame arrives. Returns `Ok(None)` when the read timed
/// out between frames, so callers can re-check their stop flags and try
/// again. Every other failure (EOF, truncated payload, header violation)
/// is an error the caller treats as connection loss.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>> {
    let mut header_buf = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }

    let header = decode_header(&header_buf)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload)?;

    Ok(Some(Frame {
        message_type: header.message_type,
        payload,
    }))
}

/// Write one complete frame to the stream
pub fn write_frame<W: Write>(writer: &mut W, message_type: MessageType, payload: &[u8]) -> Result<()> {
    writer.write_all(&encode_frame(message_type, payload))?;
    Ok(())
}
