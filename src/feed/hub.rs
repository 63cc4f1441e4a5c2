//! Fanout Hub
//!
//! The process-wide set of connected feed consumers. Broadcast walks the
//! membership as it stood at call time; each consumer gets its own
//! bounded channel, so one slow or vanished consumer never affects the
//! rest or the producer.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::feed::protocol::FeedFrame;

/// Opaque consumer identity assigned at connect time.
pub type ConsumerId = Uuid;

/// Per-consumer outbound buffer.
pub const CONSUMER_BUFFER: usize = 64;

/// Registry of connected consumers.
pub struct FanoutHub {
    consumers: RwLock<BTreeMap<ConsumerId, mpsc::Sender<FeedFrame>>>,
}

impl FanoutHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            consumers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a consumer; returns its session id and the receiving end
    /// the connection task drains.
    pub async fn connect(&self) -> (ConsumerId, mpsc::Receiver<FeedFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        self.consumers.write().await.insert(id, tx);
        debug!(%id, "consumer connected");
        (id, rx)
    }

    /// Remove a consumer. Safe to call for an unknown id.
    pub async fn disconnect(&self, id: ConsumerId) -> bool {
        let removed = self.consumers.write().await.remove(&id).is_some();
        if removed {
            debug!(%id, "consumer disconnected");
        }
        removed
    }

    /// Send one frame directly to a single consumer, best-effort.
    pub async fn send_to(&self, id: ConsumerId, frame: FeedFrame) -> bool {
        match self.consumers.read().await.get(&id) {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver a frame to every consumer connected right now.
    ///
    /// Best-effort, at most once per consumer: a full buffer drops the
    /// frame for that consumer, a closed channel marks the consumer dead.
    /// Returns how many consumers the frame was handed to.
    pub async fn broadcast(&self, frame: FeedFrame) -> usize {
        let snapshot: Vec<(ConsumerId, mpsc::Sender<FeedFrame>)> = self
            .consumers
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(%id, "consumer buffer full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut consumers = self.consumers.write().await;
            for id in dead {
                consumers.remove(&id);
                debug!(%id, "pruned dead consumer");
            }
        }

        delivered
    }

    /// Number of connected consumers.
    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
