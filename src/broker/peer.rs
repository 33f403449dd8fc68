//! Peer state and the per-connection receive loop
//!
//! Each accepted connection gets one dedicated thread running
//! [`run_session`]. The thread performs blocking frame reads and pushes
//! every decoded message onto the incoming queue; it is the only reader of
//! its socket. A short read timeout between frames lets the loop observe
//! the global stop flag and its own registry entry.
//!
//! Failure handling is uniform: socket closed, truncated read, bad magic,
//! wrong protocol version or unknown message type all mean the connection
//! is lost. The loop then queues exactly one synthetic Disconnection for
//! the dispatcher to process and exits. It never retries and never
//! propagates the failure anywhere else.

use crate::broker::queue::IncomingQueue;
use crate::broker::registry::PeerRegistry;
use crate::broker::wire::{self, MessageType};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Unique identifier of one accepted connection; never reused
pub type PeerId = u64;

/// Connection lifecycle state
///
/// Transitions are strictly forward: `Connecting → Connected →
/// Disconnected`. `Disconnected` is terminal and immediately followed by
/// registry removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Accepted, no data seen yet
    Connecting,
    /// First data frame received
    Connected,
    /// Torn down; the registry entry is about to disappear
    Disconnected,
}

/// A decoded unit of peer input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    /// Raw bytes, meaning defined by the message type
    pub payload: Vec<u8>,
}

impl Message {
    pub(crate) fn disconnection() -> Self {
        Self {
            message_type: MessageType::Disconnection,
            payload: Vec::new(),
        }
    }
}

/// The unit carried by the incoming queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    pub peer_id: PeerId,
    pub message: Message,
}

/// One accepted connection and its state (the registry entry)
pub(crate) struct Peer {
    pub id: PeerId,
    /// Optional label assigned by the host after its handshake
    pub display_name: String,
    /// Held for force-closing; the session thread reads from its own clone
    pub stream: TcpStream,
    pub status: PeerStatus,
    /// Joined by the dispatcher during teardown
    pub thread: Option<JoinHandle<()>>,
}

impl Peer {
    pub fn new(id: PeerId, stream: TcpStream) -> Self {
        Self {
            id,
            display_name: String::new(),
            stream,
            status: PeerStatus::Connecting,
            thread: None,
        }
    }
}

/// Read timeout between frames so the loop can observe the stop flag
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Receive loop for one peer; runs on the peer's dedicated thread
///
/// Exits when the stop flag is set, the peer is no longer registered, or
/// the connection fails. Every exit except "already unregistered" queues
/// exactly one Disconnection so the dispatcher tears the peer down.
pub(crate) fn run_session(
    id: PeerId,
    mut stream: TcpStream,
    registry: Arc<PeerRegistry>,
    queue: IncomingQueue,
    running: Arc<AtomicBool>,
) {
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        log::warn!("Peer {}: failed to set read timeout: {}", id, e);
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        if !registry.contains(id) {
            // Torn down externally; the dispatcher already decided this
            // peer's fate, so there is nothing left to announce.
            return;
        }

        match wire::read_frame(&mut stream) {
            Ok(Some(frame)) => {
                let announced_exit = frame.message_type == MessageType::Disconnection;
                queue.push(PeerMessage {
                    peer_id: id,
                    message: Message {
                        message_type: frame.message_type,
                        payload: frame.payload,
                    },
                });
                if announced_exit {
                    // The peer said goodbye itself; that frame is the one
                    // Disconnection this session delivers.
                    return;
                }
            }
            Ok(None) => {
                // Timeout between frames; re-check the flags above.
            }
            Err(e) => {
                log::error!("Connection lost to peer {}: {}", id, e);
                break;
            }
        }
    }

    if registry.contains(id) {
        queue.push(PeerMessage {
            peer_id: id,
            message: Message::disconnection(),
        });
    }
}
