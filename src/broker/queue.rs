//! Incoming message queue between peer sessions and the dispatcher
//!
//! Unbounded multi-producer, single-consumer. Every peer session pushes the
//! `(peer id, message)` pairs it decodes; the dispatcher is the only
//! consumer. A push never blocks. A pop blocks until an item arrives or the
//! shutdown sentinel is observed, which ends the stream.
//!
//! Arrival order is whatever the channel observes: a single producer's
//! pushes are seen in order, interleaving across producers is up to the
//! scheduler.

use crate::broker::peer::PeerMessage;
use crossbeam_channel::{Receiver, Sender, unbounded};

enum QueueItem {
    Message(PeerMessage),
    Shutdown,
}

/// Handle to the incoming queue
///
/// Cheap to clone; one clone per producer thread. Only the dispatcher may
/// call [`pop`](IncomingQueue::pop).
#[derive(Clone)]
pub(crate) struct IncomingQueue {
    tx: Sender<QueueItem>,
    rx: Receiver<QueueItem>,
}

impl IncomingQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue a message; never blocks
    pub fn push(&self, message: PeerMessage) {
        // Send only fails once every receiver is gone, i.e. the broker is
        // already torn down; the message is moot at that point.
        let _ = self.tx.send(QueueItem::Message(message));
    }

    /// Wake the consumer with an end-of-stream marker
    pub fn push_shutdown(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
    }

    /// Block until the next message; `None` means the stream has ended
    pub fn pop(&self) -> Option<PeerMessage> {
        match self.rx.recv() {
            Ok(QueueItem::Message(message)) => Some(message),
            Ok(QueueItem::Shutdown) | Err(_) => None,
        }
    }
}
