//! Notification Boundary
//!
//! The chat layer that renders clocks and results is an external
//! collaborator; from here, delivery is fire-and-forget over bounded
//! channels. A full channel or a gone receiver is logged and swallowed,
//! since match bookkeeping never depends on a notification landing.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::clock::{DisplaySummary, MatchSummary};

/// Channel capacity for each notification destination.
pub const NOTIFY_BUFFER: usize = 64;

/// A structured message for display to humans.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Live clock refresh for the match channel.
    Display(DisplaySummary),
    /// Final result of a match.
    MatchComplete(MatchSummary),
}

/// Publishes notifications for one match channel, plus an optional
/// secondary results destination configured at runtime.
pub struct Notifier {
    channel_tx: mpsc::Sender<Notification>,
    results_tx: Mutex<Option<mpsc::Sender<Notification>>>,
}

impl Notifier {
    /// Create a notifier and the receiving end the presenter consumes.
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(NOTIFY_BUFFER);
        (
            Self {
                channel_tx: tx,
                results_tx: Mutex::new(None),
            },
            rx,
        )
    }

    /// Point match results at a secondary destination, or disable it.
    pub fn set_results_target(&self, target: Option<mpsc::Sender<Notification>>) {
        let configured = target.is_some();
        *self.results_tx.lock().unwrap() = target;
        debug!(configured, "results destination updated");
    }

    /// Publish to the match channel. Best-effort.
    pub fn publish(&self, notification: Notification) {
        if let Err(err) = self.channel_tx.try_send(notification) {
            warn!(%err, "dropping notification for match channel");
        }
    }

    /// Publish a final result to the match channel and, when configured,
    /// the secondary results destination.
    pub fn publish_result(&self, summary: MatchSummary) {
        self.publish(Notification::MatchComplete(summary.clone()));

        let results_tx = self.results_tx.lock().unwrap().clone();
        if let Some(tx) = results_tx {
            if let Err(err) = tx.try_send(Notification::MatchComplete(summary)) {
                warn!(%err, "dropping notification for results destination");
            }
        }
    }
}
