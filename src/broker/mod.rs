//! TCP message broker for external tool connections
//!
//! Lets independent client processes stream data into the host application
//! over TCP. Each accepted connection gets a dedicated receive thread; all
//! decoded messages funnel through one queue into a single dispatcher
//! thread, which owns every peer state change and every handler callback.
//!
//! ```text
//! acceptor ──▶ registry (insert) ──▶ session (one per peer)
//!                                        │ (peer id, message)
//!                                        ▼
//!                                  incoming queue ──▶ dispatcher ──▶ handler
//!                                                          │
//!                                                 registry (update/remove)
//! ```
//!
//! Misbehaving peers can only ever cause their own disconnection; no
//! condition in this module is fatal to the process.

mod peer;
mod queue;
mod registry;
mod server;
pub mod wire;

pub use peer::{Message, PeerId, PeerMessage, PeerStatus};
pub use server::{Broker, PeerEventHandler};
pub use wire::MessageType;
