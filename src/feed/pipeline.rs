//! Kill-Event Pipeline
//!
//! Subscribes to the pushed kill-record channel, filters each record, and
//! broadcasts survivors through the hub. Runs until the producer side of
//! the channel goes away.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::feed::event::KillEvent;
use crate::feed::filter::{should_forward, FeedFilter};
use crate::feed::hub::FanoutHub;
use crate::feed::protocol::FeedFrame;

/// Drain the kill-record channel through the filter into the hub.
pub async fn run_pipeline(
    mut events: mpsc::Receiver<KillEvent>,
    filter: FeedFilter,
    hub: Arc<FanoutHub>,
) {
    info!("kill-event pipeline started");
    while let Some(event) = events.recv().await {
        if !should_forward(&event, &filter) {
            debug!(?event.killer, ?event.victim, "kill filtered out");
            continue;
        }
        let delivered = hub.broadcast(FeedFrame::Kill { payload: event }).await;
        debug!(delivered, "kill forwarded");
    }
    info!("kill-event source closed, pipeline ending");
}
