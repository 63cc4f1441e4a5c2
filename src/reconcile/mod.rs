//! Reconciliation Loop
//!
//! The periodic process that keeps a running clock honest against the
//! external game state: refresh the live snapshot, detect the in-game
//! clock running out (auto-stop), and push a display refresh. Ticks for
//! one clock never overlap: the loop awaits each tick before the
//! interval hands out the next, and missed ticks are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::{finalize, ChannelId, ClockRegistry, ClockState, StopReason};
use crate::notify::{Notification, Notifier};
use crate::source::{ConnectionStatus, SourceConnector, SourceError};
use crate::{
    DEFAULT_AUTO_STOP_THRESHOLD_SECS, DEFAULT_AUTO_STOP_WARMUP_SECS,
    DEFAULT_RECONCILE_INTERVAL_SECS,
};

/// Bounded reconnect policy: exponential backoff, capped attempts per tick.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Connect attempts per tick.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt `attempt` (0-based; the first attempt
    /// has no delay).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
        exp.min(self.max_delay)
    }
}

/// Tuning for the reconciliation loop.
///
/// The warm-up and stop thresholds depend on the external game timer's
/// granularity, so they are parameters rather than hard constants.
#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Timeout for one live-status poll.
    pub source_timeout: Duration,
    /// Seconds after match start before auto-stop is considered.
    pub warmup_secs: i64,
    /// Remaining in-game seconds at or under which the match is ending.
    pub stop_threshold_secs: u32,
    /// Reconnect policy on poll failure.
    pub retry: RetryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            source_timeout: Duration::from_secs(15),
            warmup_secs: DEFAULT_AUTO_STOP_WARMUP_SECS,
            stop_threshold_secs: DEFAULT_AUTO_STOP_THRESHOLD_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    /// Read tuning overrides from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_secs("UPDATE_INTERVAL").map(Duration::from_secs).unwrap_or(defaults.interval),
            source_timeout: env_secs("GAME_API_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.source_timeout),
            warmup_secs: env_secs("AUTO_STOP_WARMUP_SECS")
                .map(|v| v as i64)
                .unwrap_or(defaults.warmup_secs),
            stop_threshold_secs: env_secs("AUTO_STOP_THRESHOLD_SECS")
                .map(|v| v as u32)
                .unwrap_or(defaults.stop_threshold_secs),
            retry: defaults.retry,
        }
    }
}

fn env_secs(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The clock no longer exists; stop the loop.
    ClockGone,
    /// The match is not running; stop the loop.
    Stopped,
    /// The auto-stop fired and the match was finalized.
    AutoFinalized,
    /// Snapshot and display were refreshed.
    Refreshed,
}

/// Run the loop for one channel until its match stops.
pub async fn run(
    registry: Arc<ClockRegistry>,
    notifier: Arc<Notifier>,
    connector: Arc<dyn SourceConnector>,
    channel: ChannelId,
    config: ReconcileConfig,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let outcome = tick(
            &registry,
            &notifier,
            connector.as_ref(),
            channel,
            &config,
            Utc::now(),
        )
        .await;

        match outcome {
            TickOutcome::Refreshed => {}
            TickOutcome::AutoFinalized | TickOutcome::Stopped | TickOutcome::ClockGone => {
                debug!(channel, ?outcome, "reconcile loop ending");
                break;
            }
        }
    }
}

/// One reconciliation pass over a clock.
pub async fn tick(
    registry: &ClockRegistry,
    notifier: &Notifier,
    connector: &dyn SourceConnector,
    channel: ChannelId,
    config: &ReconcileConfig,
    now: DateTime<Utc>,
) -> TickOutcome {
    let clock_arc = match registry.get(channel).await {
        Some(arc) => arc,
        None => return TickOutcome::ClockGone,
    };
    let mut clock = clock_arc.write().await;

    if !clock.started {
        return TickOutcome::Stopped;
    }

    refresh_snapshot(&mut clock, connector, config, now).await;

    // Auto-stop guard: the feed can report stale or zero remaining time
    // right after start, so nothing fires inside the warm-up window, and a
    // zero reading never counts as "ending".
    let running_secs = (now - clock.match_start_time).num_seconds();
    let snapshot = &clock.live_snapshot;
    if running_secs > config.warmup_secs
        && snapshot.connection == ConnectionStatus::Connected
        && snapshot.remaining_secs > 0
        && snapshot.remaining_secs <= config.stop_threshold_secs
    {
        info!(
            channel,
            remaining_secs = snapshot.remaining_secs,
            "game time ended, automatically stopping match"
        );
        let result = finalize(&mut clock, now, StopReason::AutoTimeout);
        if let Some(mut session) = result.session {
            let announcement = result.summary.announcement();
            let announce = session.send_server_message(&announcement);
            match timeout(config.source_timeout, announce).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => debug!("server has no message endpoint, skipping final announce"),
                Ok(Err(err)) => warn!(%err, "failed to announce final result in game"),
                Err(_) => warn!("final in-game announce timed out"),
            }
            session.close().await;
        }
        notifier.publish_result(result.summary);
        return TickOutcome::AutoFinalized;
    }

    // Non-authoritative display refresh; failures are logged inside the
    // notifier and never abort the loop.
    notifier.publish(Notification::Display(clock.display_summary(now)));
    TickOutcome::Refreshed
}

/// Refresh the live snapshot from the source, reconnecting best-effort.
async fn refresh_snapshot(
    clock: &mut ClockState,
    connector: &dyn SourceConnector,
    config: &ReconcileConfig,
    now: DateTime<Utc>,
) {
    let poll = match clock.session.as_mut() {
        Some(session) => match timeout(config.source_timeout, session.live_status()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Transport("live status poll timed out".into())),
        },
        None => Err(SourceError::Closed),
    };

    match poll {
        Ok(status) => {
            clock.live_snapshot.map = status.map;
            clock.live_snapshot.players = status.players;
            clock.live_snapshot.remaining_secs = status.remaining_secs;
            clock.live_snapshot.connection = ConnectionStatus::Connected;
            clock.live_snapshot.last_update = Some(now);
        }
        Err(err) => {
            clock.live_snapshot.connection = ConnectionStatus::Disconnected;
            warn!(%err, "source update failed, attempting reconnect");
            reconnect(clock, connector, &config.retry).await;
        }
    }
}

/// Bounded reconnect: up to `max_attempts` connects with backoff. A new
/// session replaces the dead one; the snapshot stays disconnected until
/// the next successful poll.
async fn reconnect(clock: &mut ClockState, connector: &dyn SourceConnector, policy: &RetryPolicy) {
    for attempt in 0..policy.max_attempts {
        let delay = policy.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match connector.connect().await {
            Ok(session) => {
                if let Some(mut dead) = clock.session.replace(session) {
                    dead.close().await;
                }
                info!(attempt, "source session re-established");
                return;
            }
            Err(err) => debug!(attempt, %err, "reconnect attempt failed"),
        }
    }
    warn!(attempts = policy.max_attempts, "reconnect attempts exhausted for this tick");
}
