//! SetuNet - TCP message broker for external tool connections
//!
//! This library lets a host application accept an unbounded number of
//! external client processes over TCP, decode their framed messages and
//! consume them at a single consistently-ordered dispatch point.

pub mod broker;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use broker::{Broker, Message, MessageType, PeerEventHandler, PeerId, PeerMessage, PeerStatus};
pub use config::AppConfig;
pub use error::{Error, Result};
