//! Clock Registry
//!
//! Owns every active match clock, keyed by the channel the match is
//! presented in. Each clock sits behind its own lock: the reconciliation
//! loop and manual commands for one match serialize against each other,
//! while different matches never contend.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::clock::state::ClockState;
use crate::source::SourceSession;

/// Identifier of the channel a match is presented in.
pub type ChannelId = u64;

/// Process-wide registry of active clocks.
///
/// Passed by reference wherever clocks are touched; there is no ambient
/// global instance.
pub struct ClockRegistry {
    clocks: RwLock<BTreeMap<ChannelId, Arc<RwLock<ClockState>>>>,
}

impl ClockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            clocks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the clock for a channel, allocating a fresh one if absent.
    pub async fn get_or_create(&self, channel: ChannelId, now: DateTime<Utc>) -> Arc<RwLock<ClockState>> {
        let mut clocks = self.clocks.write().await;
        clocks
            .entry(channel)
            .or_insert_with(|| {
                info!(channel, "clock created");
                Arc::new(RwLock::new(ClockState::new(now)))
            })
            .clone()
    }

    /// Get the clock for a channel, if one exists.
    pub async fn get(&self, channel: ChannelId) -> Option<Arc<RwLock<ClockState>>> {
        self.clocks.read().await.get(&channel).cloned()
    }

    /// Replace a channel's clock with a fresh one.
    ///
    /// Returns the old clock's source session, if it still held one, so the
    /// caller can release it. Holders of the old `Arc` keep a detached
    /// clock; the registry only hands out the fresh one from here on.
    pub async fn reset(&self, channel: ChannelId, now: DateTime<Utc>) -> Option<SourceSession> {
        let mut clocks = self.clocks.write().await;
        let old = clocks.insert(channel, Arc::new(RwLock::new(ClockState::new(now))));
        info!(channel, "clock reset");
        match old {
            Some(old_arc) => old_arc.write().await.take_session(),
            None => None,
        }
    }

    /// Drop a channel's clock entirely.
    ///
    /// Returns the session for release, like [`reset`](Self::reset).
    pub async fn remove(&self, channel: ChannelId) -> Option<SourceSession> {
        let old = self.clocks.write().await.remove(&channel);
        match old {
            Some(old_arc) => old_arc.write().await.take_session(),
            None => None,
        }
    }

    /// Number of tracked clocks.
    pub async fn count(&self) -> usize {
        self.clocks.read().await.len()
    }
}

impl Default for ClockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::state::Side;
    use crate::clock::switch::switch_to;
    use crate::clock::SwitchMethod;
    use crate::source::sim::SimulatedWorld;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_clocks_are_independent_per_channel() {
        let registry = ClockRegistry::new();
        let one = registry.get_or_create(1, t(0)).await;
        let two = registry.get_or_create(2, t(0)).await;

        {
            let mut clock = one.write().await;
            switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
            switch_to(&mut clock, Side::Axis, t(60), SwitchMethod::Manual);
        }

        assert_eq!(one.read().await.time(Side::Allies), 60.0);
        assert_eq!(two.read().await.time(Side::Allies), 0.0);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_clock() {
        let registry = ClockRegistry::new();
        let first = registry.get_or_create(9, t(0)).await;
        let again = registry.get_or_create(9, t(100)).await;
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_reset_hands_back_session() {
        let registry = ClockRegistry::new();
        let world = SimulatedWorld::new();

        let clock_arc = registry.get_or_create(4, t(0)).await;
        clock_arc.write().await.session = Some(world.session());

        let mut session = registry.reset(4, t(50)).await.expect("old session");
        assert!(session.is_open());
        session.close().await;

        let fresh = registry.get(4).await.unwrap();
        assert!(fresh.read().await.session.is_none());
        assert_eq!(fresh.read().await.match_start_time, t(50));
    }

    #[tokio::test]
    async fn test_remove_missing_channel() {
        let registry = ClockRegistry::new();
        assert!(registry.remove(99).await.is_none());
    }
}
