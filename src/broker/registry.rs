//! Authoritative mapping of live peer ids to their state
//!
//! The registry is the only structure touched by more than one thread
//! family: the acceptor inserts, the dispatcher mutates and removes, and
//! each session checks its own entry. Everything goes through this one
//! accessor type, under one mutex. The live-connection counter is kept
//! under the same lock as the map, so it can never drift from the statuses.

use crate::broker::peer::{Peer, PeerId, PeerStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Shutdown;
use std::thread::JoinHandle;

struct Inner {
    peers: HashMap<PeerId, Peer>,
    /// Number of peers currently in `Connected` status
    connected: usize,
}

/// Mutex-guarded peer map plus the live-connection counter
pub(crate) struct PeerRegistry {
    inner: Mutex<Inner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                peers: HashMap::new(),
                connected: 0,
            }),
        }
    }

    /// Insert a peer and attach its session thread in one lock scope
    ///
    /// The session's first registry lookup blocks on this lock, so a
    /// session can never observe a half-registered peer. If the thread
    /// fails to spawn the entry is removed again and the error returned.
    pub fn register<F>(&self, peer: Peer, spawn: F) -> std::io::Result<()>
    where
        F: FnOnce() -> std::io::Result<JoinHandle<()>>,
    {
        let mut inner = self.inner.lock();
        let id = peer.id;
        inner.peers.insert(id, peer);
        match spawn() {
            Ok(handle) => {
                if let Some(p) = inner.peers.get_mut(&id) {
                    p.thread = Some(handle);
                }
                Ok(())
            }
            Err(e) => {
                inner.peers.remove(&id);
                Err(e)
            }
        }
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.inner.lock().peers.contains_key(&id)
    }

    #[cfg(test)]
    pub fn status(&self, id: PeerId) -> Option<PeerStatus> {
        self.inner.lock().peers.get(&id).map(|p| p.status)
    }

    /// Complete the handshake: `Connecting → Connected`
    ///
    /// Returns whether the transition happened; already-connected peers
    /// are left alone, so the counter moves at most once per peer.
    pub fn mark_connected(&self, id: PeerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.peers.get_mut(&id) {
            Some(p) if p.status == PeerStatus::Connecting => {
                p.status = PeerStatus::Connected;
                inner.connected += 1;
                true
            }
            _ => false,
        }
    }

    /// Enter the terminal status; returns whether the peer was `Connected`
    pub fn mark_disconnected(&self, id: PeerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.peers.get_mut(&id) {
            Some(p) if p.status != PeerStatus::Disconnected => {
                let was_connected = p.status == PeerStatus::Connected;
                p.status = PeerStatus::Disconnected;
                if was_connected {
                    inner.connected -= 1;
                }
                was_connected
            }
            _ => false,
        }
    }

    /// Force-close a peer's socket; idempotent, unblocks its session read
    pub fn shutdown_socket(&self, id: PeerId) {
        if let Some(p) = self.inner.lock().peers.get(&id) {
            let _ = p.stream.shutdown(Shutdown::Both);
        }
    }

    /// Force-close every live peer socket (shutdown path)
    pub fn shutdown_all(&self) {
        for p in self.inner.lock().peers.values() {
            let _ = p.stream.shutdown(Shutdown::Both);
        }
    }

    /// Take the session thread handle for joining
    pub fn take_thread(&self, id: PeerId) -> Option<JoinHandle<()>> {
        self.inner
            .lock()
            .peers
            .get_mut(&id)
            .and_then(|p| p.thread.take())
    }

    /// Erase the entry; dropping the peer closes its socket if still open
    pub fn remove(&self, id: PeerId) -> bool {
        self.inner.lock().peers.remove(&id).is_some()
    }

    /// Number of peers currently `Connected` (not `Connecting`)
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connected
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().peers.is_empty()
    }

    pub fn display_name(&self, id: PeerId) -> Option<String> {
        self.inner
            .lock()
            .peers
            .get(&id)
            .map(|p| p.display_name.clone())
    }

    /// Label a peer; returns false when the peer is gone
    pub fn set_display_name(&self, id: PeerId, name: &str) -> bool {
        match self.inner.lock().peers.get_mut(&id) {
            Some(p) => {
                p.display_name = name.to_string();
                true
            }
            None => false,
        }
    }
}
