//! Clock State Definitions
//!
//! The per-match control-time ledger and everything it owns: accrued
//! per-side totals, the currently active side, the append-only switch
//! history, and the mirror of the last-known external game state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{ConnectionStatus, SourceSession};

// =============================================================================
// SIDES
// =============================================================================

/// One of the two contesting parties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The Allied side ("A" in operator shorthand).
    Allies,
    /// The Axis side ("B" in operator shorthand).
    Axis,
}

impl Side {
    /// Human-facing name used in announcements.
    pub fn display_name(self) -> &'static str {
        match self {
            Side::Allies => "Allies",
            Side::Axis => "Axis",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How a control switch was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMethod {
    /// Issued by an operator.
    Manual,
    /// Detected from the live game feed.
    Auto,
}

/// One entry of the append-only switch history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwitchRecord {
    /// Side that held the point before this switch (None for the first).
    pub from_side: Option<Side>,
    /// Side that takes the point.
    pub to_side: Side,
    /// When the switch happened.
    pub timestamp: DateTime<Utc>,
    /// Manual or auto-detected.
    pub method: SwitchMethod,
}

// =============================================================================
// LIVE SNAPSHOT
// =============================================================================

/// Last-known mirror of the external game state.
///
/// Refreshed only by the reconciliation loop; everything else just reads it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiveSnapshot {
    /// Current map name.
    pub map: String,
    /// Player count on the server.
    pub players: u32,
    /// Whether the last poll reached the source.
    pub connection: ConnectionStatus,
    /// Remaining in-game time in seconds; 0 when unknown.
    pub remaining_secs: u32,
    /// When the snapshot was last refreshed.
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            map: "Unknown".into(),
            players: 0,
            connection: ConnectionStatus::Disconnected,
            remaining_secs: 0,
            last_update: None,
        }
    }
}

// =============================================================================
// CLOCK STATE
// =============================================================================

/// The authoritative per-match control-time ledger.
///
/// Accrued totals only ever grow (a reset allocates a fresh clock instead of
/// rewinding this one). The open session (time since `last_switch_at` for
/// the active side) is not part of the totals until the next switch or the
/// finalizer flushes it.
pub struct ClockState {
    time_allies: f64,
    time_axis: f64,
    /// Which side currently holds the point.
    pub active_side: Option<Side>,
    /// Timestamp of the most recent switch; set iff a side is active.
    pub last_switch_at: Option<DateTime<Utc>>,
    /// True once an operator has started the match.
    pub started: bool,
    /// True once the first switch has occurred.
    pub clock_started: bool,
    switch_history: Vec<SwitchRecord>,
    /// When the match was created/started; gates the auto-stop guard.
    pub match_start_time: DateTime<Utc>,
    /// Whether switches from the live feed are applied automatically.
    pub auto_switch_enabled: bool,
    /// Live connection to the game-state source, exclusively owned here.
    pub session: Option<SourceSession>,
    /// Mirror of the last-known external game state.
    pub live_snapshot: LiveSnapshot,
}

impl ClockState {
    /// Create a clock in reset state.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            time_allies: 0.0,
            time_axis: 0.0,
            active_side: None,
            last_switch_at: None,
            started: false,
            clock_started: false,
            switch_history: Vec::new(),
            match_start_time: now,
            auto_switch_enabled: false,
            session: None,
            live_snapshot: LiveSnapshot::default(),
        }
    }

    /// Accrued control time for a side, excluding the open session.
    pub fn time(&self, side: Side) -> f64 {
        match side {
            Side::Allies => self.time_allies,
            Side::Axis => self.time_axis,
        }
    }

    /// Accrued control time including the open session, for display only.
    pub fn total_time(&self, side: Side, now: DateTime<Utc>) -> f64 {
        let mut total = self.time(side);
        if self.active_side == Some(side) {
            total += self.current_elapsed(now);
        }
        total
    }

    /// Duration of the open session in seconds; 0 when no side is active.
    pub fn current_elapsed(&self, now: DateTime<Utc>) -> f64 {
        match self.last_switch_at {
            Some(last) if self.active_side.is_some() => {
                let secs = (now - last).num_milliseconds() as f64 / 1000.0;
                secs.max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Number of recorded switches.
    pub fn switch_count(&self) -> usize {
        self.switch_history.len()
    }

    /// The append-only switch history.
    pub fn history(&self) -> &[SwitchRecord] {
        &self.switch_history
    }

    /// Credit elapsed seconds to a side. Callers validate plausibility first.
    pub(crate) fn credit(&mut self, side: Side, secs: f64) {
        debug_assert!(secs >= 0.0);
        match side {
            Side::Allies => self.time_allies += secs,
            Side::Axis => self.time_axis += secs,
        }
    }

    pub(crate) fn record_switch(&mut self, record: SwitchRecord) {
        self.switch_history.push(record);
    }

    /// Take the session handle out of the clock, if any.
    ///
    /// The handle is released at most once; after this the clock holds none.
    pub fn take_session(&mut self) -> Option<SourceSession> {
        self.session.take()
    }

    /// Build the non-authoritative display payload.
    pub fn display_summary(&self, now: DateTime<Utc>) -> DisplaySummary {
        let allies = self.total_time(Side::Allies, now);
        let axis = self.total_time(Side::Axis, now);
        let total = allies + axis;
        let (share_allies, share_axis) = if total > 0.0 {
            (allies / total * 100.0, axis / total * 100.0)
        } else {
            (0.0, 0.0)
        };

        DisplaySummary {
            time_allies_secs: allies,
            time_axis_secs: axis,
            time_allies: format_control_time(allies),
            time_axis: format_control_time(axis),
            share_allies,
            share_axis,
            active_side: self.active_side,
            switches: self.switch_count(),
            auto_switch: self.auto_switch_enabled,
            started: self.started,
            map: self.live_snapshot.map.clone(),
            players: self.live_snapshot.players,
            connection: self.live_snapshot.connection,
        }
    }
}

/// Live display payload handed to the notifier; a read, never a mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplaySummary {
    /// Allies control time in seconds, open session included.
    pub time_allies_secs: f64,
    /// Axis control time in seconds, open session included.
    pub time_axis_secs: f64,
    /// Allies control time, `H:MM:SS`.
    pub time_allies: String,
    /// Axis control time, `H:MM:SS`.
    pub time_axis: String,
    /// Allies share of total control time, percent.
    pub share_allies: f64,
    /// Axis share of total control time, percent.
    pub share_axis: f64,
    /// Side currently holding the point.
    pub active_side: Option<Side>,
    /// Switches so far.
    pub switches: usize,
    /// Auto-switch toggle state.
    pub auto_switch: bool,
    /// Whether the match is running.
    pub started: bool,
    /// Map name from the live snapshot.
    pub map: String,
    /// Player count from the live snapshot.
    pub players: u32,
    /// Source connection state from the live snapshot.
    pub connection: ConnectionStatus,
}

/// Format seconds as `H:MM:SS` for announcements and summaries.
pub fn format_control_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fresh_clock_is_reset() {
        let clock = ClockState::new(t(0));
        assert_eq!(clock.time(Side::Allies), 0.0);
        assert_eq!(clock.time(Side::Axis), 0.0);
        assert!(clock.active_side.is_none());
        assert!(clock.last_switch_at.is_none());
        assert!(!clock.started);
        assert!(!clock.clock_started);
        assert_eq!(clock.switch_count(), 0);
    }

    #[test]
    fn test_total_time_includes_open_session() {
        let mut clock = ClockState::new(t(0));
        clock.active_side = Some(Side::Allies);
        clock.last_switch_at = Some(t(0));
        clock.credit(Side::Allies, 40.0);

        assert_eq!(clock.time(Side::Allies), 40.0);
        assert_eq!(clock.total_time(Side::Allies, t(10)), 50.0);
        assert_eq!(clock.total_time(Side::Axis, t(10)), 0.0);
    }

    #[test]
    fn test_current_elapsed_without_active_side() {
        let mut clock = ClockState::new(t(0));
        clock.last_switch_at = None;
        assert_eq!(clock.current_elapsed(t(100)), 0.0);
    }

    #[test]
    fn test_format_control_time() {
        assert_eq!(format_control_time(0.0), "0:00:00");
        assert_eq!(format_control_time(61.0), "0:01:01");
        assert_eq!(format_control_time(3_723.9), "1:02:03");
        assert_eq!(format_control_time(-5.0), "0:00:00");
    }

    #[test]
    fn test_display_summary_shares() {
        let mut clock = ClockState::new(t(0));
        clock.credit(Side::Allies, 300.0);
        clock.credit(Side::Axis, 100.0);

        let summary = clock.display_summary(t(0));
        assert!((summary.share_allies - 75.0).abs() < 1e-9);
        assert!((summary.share_axis - 25.0).abs() < 1e-9);
        assert_eq!(summary.time_allies, "0:05:00");
    }
}
