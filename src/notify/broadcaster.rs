//! Publish/subscribe channel for engine notifications
//!
//! Components publish through the `Publisher` trait; the `Broadcaster`
//! implementation fans each notification out to every subscriber over a
//! tokio broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::events::{Envelope, Notification};
use crate::utils::current_timestamp_millis;

/// Abstract publish surface used by the engine
pub trait Publisher: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Event broadcaster backed by a tokio broadcast channel
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
    sequence_counter: AtomicU64,
}

impl Broadcaster {
    /// Create a new broadcaster with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sequence_counter: AtomicU64::new(0),
        }
    }

    /// Get the current sequence ID
    pub fn current_sequence_id(&self) -> u64 {
        self.sequence_counter.load(Ordering::SeqCst)
    }

    /// Subscribe to receive published notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        // Slow subscribers that fall more than 1024 messages behind must refresh
        Self::new(1024)
    }
}

impl Publisher for Broadcaster {
    fn publish(&self, notification: Notification) {
        let seq = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let msg = Envelope {
            notification,
            sequence_id: seq,
            timestamp: current_timestamp_millis(),
        };
        // Ignore errors - just means no subscribers are connected
        let _ = self.tx.send(msg);
    }
}
