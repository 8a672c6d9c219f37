//! Packet fan-out to connected observers
//!
//! Each observer owns the receiving half of a bounded channel. Publishing
//! never waits: a full or closed channel counts as a failed send and the
//! observer is dropped from the registry. The registry lock is only held
//! to snapshot or edit the map, never while sending.

use super::packet::TelemetryPacket;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Default number of frames an observer may fall behind before it is dropped
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// Registry key for one observer
pub type ObserverId = u64;

type Frame = Arc<str>;

/// Registry of observers on the data channel
#[derive(Debug)]
pub struct Broadcaster {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Frame>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, mpsc::Sender<Frame>>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new observer and return the receiving end of its channel
    pub fn register(&self) -> (ObserverId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        (self.register_sender(tx), rx)
    }

    /// Register an existing channel sender as an observer
    pub fn register_sender(&self, sender: mpsc::Sender<Frame>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, sender);
        tracing::debug!(observer = id, "Observer registered");
        id
    }

    /// Remove an observer; returns false if it was already gone
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer = id, "Observer unregistered");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_registered(&self, id: ObserverId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Serialize the packet and send it to every observer
    ///
    /// Returns the number of observers that accepted the frame.
    pub fn publish(&self, packet: &TelemetryPacket) -> Result<usize> {
        let json = packet.to_json()?;
        Ok(self.publish_text(Arc::from(json)))
    }

    /// Send a preformatted frame to every observer
    pub fn publish_text(&self, frame: Frame) -> usize {
        let snapshot: Vec<(ObserverId, mpsc::Sender<Frame>)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(observer = id, error = %e, "Dropping observer after failed send");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut observers = self.lock();
            for id in failed {
                observers.remove(&id);
            }
        }
        delivered
    }
}
