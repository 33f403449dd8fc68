//! Broker lifecycle: acceptor thread, dispatcher thread, start/stop
//!
//! # Thread model
//!
//! - One **acceptor** thread blocks on the listening socket, allocates peer
//!   ids and spawns a session thread per accepted connection.
//! - One **session** thread per peer performs blocking frame reads (see
//!   the peer module).
//! - One **dispatcher** thread drains the incoming queue and is the only
//!   place peer state changes after registration: handshake completion,
//!   handler callbacks and teardown all happen here, so every peer's
//!   messages are handled in send order and teardown can never race with
//!   dispatch.
//!
//! # Shutdown
//!
//! `stop()` flips the stop flag, joins the acceptor, force-closes every
//! live peer socket (each session then queues its terminal Disconnection),
//! waits for the dispatcher to finish tearing all peers down, then pushes
//! the queue sentinel and joins the dispatcher. When it returns, no
//! subsystem thread remains and the registry is empty.

use crate::broker::peer::{self, Peer, PeerId, PeerMessage};
use crate::broker::queue::IncomingQueue;
use crate::broker::registry::PeerRegistry;
use crate::broker::wire::MessageType;
use crate::error::{Error, Result};
use log::{debug, error, info, trace, warn};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callbacks the broker invokes with decoded peer input
///
/// Both methods run on the dispatcher thread only. A callback that blocks
/// stalls dispatch for every peer, so keep them short.
pub trait PeerEventHandler: Send {
    /// One call per Data frame, in the order the peer sent them
    fn on_data(&mut self, peer_id: PeerId, payload: &[u8]);

    /// Exactly once per peer, after its teardown is decided
    fn on_disconnect(&mut self, peer_id: PeerId);
}

/// First peer id handed out
const PEER_ID_BASE: u64 = 1;

/// Idle sleep when no connection is pending
const ACCEPT_IDLE: Duration = Duration::from_millis(10);

/// Poll interval while waiting for peer teardown during stop
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// TCP message broker for external tool connections
///
/// Owns all subsystem state explicitly; nothing lives in process globals.
/// Dropping a running broker stops it.
///
/// ```no_run
/// use setu_net::{Broker, PeerEventHandler, PeerId};
///
/// struct Printer;
///
/// impl PeerEventHandler for Printer {
///     fn on_data(&mut self, peer_id: PeerId, payload: &[u8]) {
///         println!("peer {} sent {} bytes", peer_id, payload.len());
///     }
///     fn on_disconnect(&mut self, peer_id: PeerId) {
///         println!("peer {} left", peer_id);
///     }
/// }
///
/// let mut broker = Broker::new(Box::new(Printer));
/// broker.start(4700)?;
/// // ... host application runs ...
/// broker.stop();
/// # Ok::<(), setu_net::Error>(())
/// ```
pub struct Broker {
    registry: Arc<PeerRegistry>,
    queue: IncomingQueue,
    running: Arc<AtomicBool>,
    /// Monotonic id source; survives restarts so ids are never reused
    next_peer_id: Arc<AtomicU64>,
    /// Present while stopped; moved into the dispatcher while running
    handler: Option<Box<dyn PeerEventHandler>>,
    acceptor: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<Box<dyn PeerEventHandler>>>,
    local_addr: Option<SocketAddr>,
}

impl Broker {
    pub fn new(handler: Box<dyn PeerEventHandler>) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new()),
            queue: IncomingQueue::new(),
            running: Arc::new(AtomicBool::new(false)),
            next_peer_id: Arc::new(AtomicU64::new(PEER_ID_BASE)),
            handler: Some(handler),
            acceptor: None,
            dispatcher: None,
            local_addr: None,
        }
    }

    /// Bind the port and start accepting peers
    ///
    /// No-op when already started. Binding port 0 picks an ephemeral port;
    /// see [`local_addr`](Broker::local_addr).
    pub fn start(&mut self, port: u16) -> Result<()> {
        if self.acceptor.is_some() {
            debug!("Broker already started, ignoring start()");
            return Ok(());
        }

        let listener = TcpListener::bind(("0.0.0.0", port))?;
        // Nonblocking accept plus a short idle sleep keeps the acceptor
        // responsive to the stop flag without platform socket tricks.
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let handler = self
            .handler
            .take()
            .ok_or_else(|| Error::Other("broker handler unavailable".to_string()))?;

        self.running.store(true, Ordering::Relaxed);
        // Fresh queue per run so a previous run's sentinel cannot end the
        // new dispatcher early.
        self.queue = IncomingQueue::new();

        // Dispatcher first: if the acceptor fails to spawn, the dispatcher
        // can be unwound and the handler recovered.
        let dispatcher = {
            let registry = Arc::clone(&self.registry);
            let queue = self.queue.clone();
            let spawned = thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || dispatch_loop(registry, queue, handler));
            match spawned {
                Ok(d) => d,
                Err(e) => {
                    self.running.store(false, Ordering::Relaxed);
                    return Err(e.into());
                }
            }
        };

        let acceptor = {
            let registry = Arc::clone(&self.registry);
            let queue = self.queue.clone();
            let running = Arc::clone(&self.running);
            let next_peer_id = Arc::clone(&self.next_peer_id);
            let spawned = thread::Builder::new()
                .name("acceptor".to_string())
                .spawn(move || accept_loop(listener, registry, queue, running, next_peer_id));
            match spawned {
                Ok(a) => a,
                Err(e) => {
                    self.running.store(false, Ordering::Relaxed);
                    self.queue.push_shutdown();
                    if let Ok(handler) = dispatcher.join() {
                        self.handler = Some(handler);
                    }
                    return Err(e.into());
                }
            }
        };

        self.acceptor = Some(acceptor);
        self.dispatcher = Some(dispatcher);
        self.local_addr = Some(addr);

        info!("Broker listening on {}", addr);
        Ok(())
    }

    /// Graceful shutdown; blocks until every subsystem thread has joined
    ///
    /// Every live peer receives its `on_disconnect` callback before this
    /// returns. No-op when already stopped.
    pub fn stop(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            debug!("Broker already stopped, ignoring stop()");
            return;
        };

        info!("Broker shutting down");
        self.running.store(false, Ordering::Relaxed);

        if acceptor.join().is_err() {
            warn!("Acceptor thread panicked");
        }

        // Unblock every session read; each session then queues its
        // terminal Disconnection for the dispatcher.
        self.registry.shutdown_all();

        // An empty registry means the dispatcher has processed every
        // teardown and joined every session thread.
        while !self.registry.is_empty() {
            thread::sleep(DRAIN_POLL);
        }

        self.queue.push_shutdown();
        if let Some(dispatcher) = self.dispatcher.take() {
            match dispatcher.join() {
                Ok(handler) => self.handler = Some(handler),
                Err(_) => warn!("Dispatcher thread panicked"),
            }
        }

        self.local_addr = None;
        info!("Broker stopped");
    }

    /// Number of peers currently connected (handshake completed)
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Address the broker is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// A peer's label; `Some("")` until the host assigns one, `None` once
    /// the peer is gone
    pub fn peer_name(&self, peer_id: PeerId) -> Option<String> {
        self.registry.display_name(peer_id)
    }

    /// Label a peer after its application-level handshake
    ///
    /// The label shows up in the broker's disconnect log line. Returns
    /// false when the peer is no longer registered.
    pub fn set_peer_name(&self, peer_id: PeerId, name: &str) -> bool {
        self.registry.set_display_name(peer_id, name)
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Acceptor loop: allocate ids, register peers, spawn session threads
fn accept_loop(
    listener: TcpListener,
    registry: Arc<PeerRegistry>,
    queue: IncomingQueue,
    running: Arc<AtomicBool>,
    next_peer_id: Arc<AtomicU64>,
) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("Failed to set blocking mode for {}: {}", addr, e);
                    continue;
                }
                let session_stream = match stream.try_clone() {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Failed to clone socket for {}: {}", addr, e);
                        continue;
                    }
                };

                let id = next_peer_id.fetch_add(1, Ordering::Relaxed);
                info!("Peer {} connecting from {}", id, addr);

                let spawn = {
                    let registry = Arc::clone(&registry);
                    let queue = queue.clone();
                    let running = Arc::clone(&running);
                    move || {
                        thread::Builder::new().name(format!("peer-{}", id)).spawn(
                            move || peer::run_session(id, session_stream, registry, queue, running),
                        )
                    }
                };
                if let Err(e) = registry.register(Peer::new(id, stream), spawn) {
                    error!("Failed to start session for peer {}: {}", id, e);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_IDLE);
            }
            Err(e) => {
                // Expected while stopping; anything else is logged and the
                // loop keeps accepting.
                if running.load(Ordering::Relaxed) {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
    debug!("Acceptor thread exiting");
}

/// Dispatcher loop: sole consumer of the incoming queue
fn dispatch_loop(
    registry: Arc<PeerRegistry>,
    queue: IncomingQueue,
    mut handler: Box<dyn PeerEventHandler>,
) -> Box<dyn PeerEventHandler> {
    while let Some(peer_message) = queue.pop() {
        handle_peer_message(&registry, peer_message, handler.as_mut());
    }
    debug!("Dispatcher thread exiting");
    handler
}

fn handle_peer_message(
    registry: &PeerRegistry,
    peer_message: PeerMessage,
    handler: &mut dyn PeerEventHandler,
) {
    let PeerMessage { peer_id, message } = peer_message;

    if !registry.contains(peer_id) {
        // Late in-flight message for a peer already torn down; expected
        // race, not an error.
        trace!("Dropping message for unknown peer {}", peer_id);
        return;
    }

    match message.message_type {
        MessageType::Data => {
            if registry.mark_connected(peer_id) {
                info!(
                    "Peer {} connected ({} live)",
                    peer_id,
                    registry.connection_count()
                );
            }
            handler.on_data(peer_id, &message.payload);
        }
        MessageType::Disconnection => {
            registry.mark_disconnected(peer_id);
            registry.shutdown_socket(peer_id);
            if let Some(session) = registry.take_thread(peer_id)
                && session.join().is_err()
            {
                warn!("Session thread for peer {} panicked", peer_id);
            }
            let name = registry.display_name(peer_id).unwrap_or_default();
            registry.remove(peer_id);
            handler.on_disconnect(peer_id);

            if name.is_empty() {
                info!("Peer {} disconnected", peer_id);
            } else {
                info!("Peer {} ({}) disconnected", peer_id, name);
            }
        }
    }
}
