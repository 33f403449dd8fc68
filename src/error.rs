//! Error types for SetuNet

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuNet error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame did not start with the protocol marker
    #[error("bad frame magic: expected {expected:02x?}, got {actual:02x?}")]
    BadMagic {
        /// The marker this broker speaks
        expected: [u8; 2],
        /// The bytes actually received
        actual: [u8; 2],
    },

    /// Remote speaks a different protocol version
    #[error("protocol version mismatch: remote {remote}, local {local}")]
    VersionMismatch {
        /// Version announced by the remote peer
        remote: u32,
        /// Version supported by this broker
        local: u32,
    },

    /// Message type value not understood
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(u32),

    /// Declared payload length above the frame limit
    #[error("frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge {
        /// Length declared in the frame header
        size: u32,
        /// Maximum accepted payload length
        limit: u32,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
