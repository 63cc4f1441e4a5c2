//! Finalizer
//!
//! Closes out a clock once: flushes the open session into the totals,
//! computes the winner, and hands back the source session for release.
//! Callers guard re-entry with `started`: a stopped clock is never
//! finalized again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::state::{format_control_time, ClockState, Side};
use crate::clock::switch::credit_open_session;
use crate::source::SourceSession;

/// Why a match was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Operator pressed stop.
    Manual,
    /// The external game clock ran out.
    AutoTimeout,
}

/// Final result of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Final Allies control time in seconds.
    pub time_allies_secs: f64,
    /// Final Axis control time in seconds.
    pub time_axis_secs: f64,
    /// Winning side; `None` for a draw.
    pub winner: Option<Side>,
    /// Absolute control-time advantage in seconds.
    pub margin_secs: f64,
    /// Total recorded switches.
    pub switches: usize,
    /// Why the match ended.
    pub reason: StopReason,
    /// Map name from the last snapshot.
    pub map: String,
}

impl MatchSummary {
    /// Announcement line sent to the game server.
    pub fn announcement(&self) -> String {
        let verdict = match self.winner {
            Some(side) => format!("{} controlled the center longer!", side),
            None => "Perfect tie - equal control time!".into(),
        };
        format!(
            "Match Complete! {} Allies: {} | Axis: {}",
            verdict,
            format_control_time(self.time_allies_secs),
            format_control_time(self.time_axis_secs),
        )
    }
}

/// Everything `finalize` produced: the summary, what the final flush
/// credited, and the session handle the caller must release.
pub struct FinalizeOutcome {
    /// The computed result.
    pub summary: MatchSummary,
    /// Side and seconds credited by the final flush, if a session was open.
    pub final_credit: Option<(Side, f64)>,
    /// The source session taken out of the clock, to be closed by the caller.
    pub session: Option<SourceSession>,
}

/// Close out the clock at `now`.
///
/// If a side still holds the point, the open session is flushed with the
/// same plausibility rules the switch engine applies. Always clears
/// `active_side` and `started` and takes the session handle out of the
/// clock, whatever the credit outcome was.
pub fn finalize(clock: &mut ClockState, now: DateTime<Utc>, reason: StopReason) -> FinalizeOutcome {
    let final_credit = credit_open_session(clock, now).unwrap_or_default();

    clock.active_side = None;
    clock.last_switch_at = None;
    clock.started = false;

    let session = clock.take_session();

    let time_allies = clock.time(Side::Allies);
    let time_axis = clock.time(Side::Axis);
    let winner = if time_allies > time_axis {
        Some(Side::Allies)
    } else if time_axis > time_allies {
        Some(Side::Axis)
    } else {
        None
    };

    let summary = MatchSummary {
        time_allies_secs: time_allies,
        time_axis_secs: time_axis,
        winner,
        margin_secs: (time_allies - time_axis).abs(),
        switches: clock.switch_count(),
        reason,
        map: clock.live_snapshot.map.clone(),
    };

    info!(
        winner = ?summary.winner,
        margin_secs = summary.margin_secs,
        switches = summary.switches,
        ?reason,
        "match finalized"
    );

    FinalizeOutcome {
        summary,
        final_credit,
        session,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::state::SwitchMethod;
    use crate::clock::switch::switch_to;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn started_clock() -> ClockState {
        let mut clock = ClockState::new(t(0));
        clock.started = true;
        clock
    }

    #[test]
    fn test_switch_script_and_finalize() {
        // start -> A at 0 -> B at 100 -> A at 250 -> finalize at 400
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        switch_to(&mut clock, Side::Axis, t(100), SwitchMethod::Manual);
        switch_to(&mut clock, Side::Allies, t(250), SwitchMethod::Manual);

        let outcome = finalize(&mut clock, t(400), StopReason::Manual);

        assert_eq!(outcome.summary.time_allies_secs, 250.0);
        assert_eq!(outcome.summary.time_axis_secs, 150.0);
        assert_eq!(outcome.summary.winner, Some(Side::Allies));
        assert_eq!(outcome.summary.margin_secs, 100.0);
        assert_eq!(outcome.summary.switches, 3);
        assert_eq!(outcome.final_credit, Some((Side::Allies, 150.0)));
        assert!(!clock.started);
        assert!(clock.active_side.is_none());
    }

    #[test]
    fn test_single_switch_then_finalize() {
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);

        let outcome = finalize(&mut clock, t(30), StopReason::Manual);

        assert_eq!(outcome.summary.time_allies_secs, 30.0);
        assert_eq!(outcome.summary.time_axis_secs, 0.0);
        assert_eq!(outcome.summary.winner, Some(Side::Allies));
    }

    #[test]
    fn test_finalize_without_any_switch() {
        let mut clock = started_clock();
        let outcome = finalize(&mut clock, t(60), StopReason::Manual);

        assert_eq!(outcome.summary.time_allies_secs, 0.0);
        assert_eq!(outcome.summary.time_axis_secs, 0.0);
        assert_eq!(outcome.summary.winner, None);
        assert_eq!(outcome.final_credit, None);
    }

    #[test]
    fn test_second_finalize_does_not_double_credit() {
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Axis, t(0), SwitchMethod::Manual);

        let first = finalize(&mut clock, t(50), StopReason::Manual);
        assert_eq!(first.summary.time_axis_secs, 50.0);

        // A second call finds no active side and flushes nothing.
        let second = finalize(&mut clock, t(500), StopReason::Manual);
        assert_eq!(second.summary.time_axis_secs, 50.0);
        assert_eq!(second.final_credit, None);
    }

    #[test]
    fn test_draw_on_equal_totals() {
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        switch_to(&mut clock, Side::Axis, t(120), SwitchMethod::Manual);

        let outcome = finalize(&mut clock, t(240), StopReason::AutoTimeout);

        assert_eq!(outcome.summary.time_allies_secs, 120.0);
        assert_eq!(outcome.summary.time_axis_secs, 120.0);
        assert_eq!(outcome.summary.winner, None);
        assert_eq!(outcome.summary.margin_secs, 0.0);
        assert_eq!(outcome.summary.reason, StopReason::AutoTimeout);
    }

    #[test]
    fn test_finalize_does_not_grow_history() {
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        switch_to(&mut clock, Side::Axis, t(10), SwitchMethod::Auto);

        finalize(&mut clock, t(20), StopReason::Manual);
        assert_eq!(clock.switch_count(), 2);
    }

    #[test]
    fn test_implausible_final_session_not_credited() {
        let mut clock = started_clock();
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);

        // Final flush 5 hours later fails the plausibility check.
        let outcome = finalize(&mut clock, t(18_000), StopReason::Manual);
        assert_eq!(outcome.summary.time_allies_secs, 0.0);
        assert_eq!(outcome.final_credit, None);
        assert!(!clock.started);
    }

    #[test]
    fn test_winner_is_total_order_over_random_scripts() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut clock = started_clock();
            let mut at = 0i64;
            for _ in 0..rng.gen_range(1..20) {
                let side = if rng.gen_bool(0.5) { Side::Allies } else { Side::Axis };
                switch_to(&mut clock, side, t(at), SwitchMethod::Auto);
                at += rng.gen_range(0..600);
            }

            let outcome = finalize(&mut clock, t(at), StopReason::Manual);
            let (a, b) = (
                outcome.summary.time_allies_secs,
                outcome.summary.time_axis_secs,
            );
            match outcome.summary.winner {
                Some(Side::Allies) => assert!(a > b),
                Some(Side::Axis) => assert!(b > a),
                None => assert_eq!(a, b),
            }
            assert_eq!(outcome.summary.margin_secs, (a - b).abs());
        }
    }

    #[test]
    fn test_announcement_wording() {
        let summary = MatchSummary {
            time_allies_secs: 250.0,
            time_axis_secs: 150.0,
            winner: Some(Side::Allies),
            margin_secs: 100.0,
            switches: 3,
            reason: StopReason::Manual,
            map: "Unknown".into(),
        };
        let line = summary.announcement();
        assert!(line.contains("Allies controlled the center longer!"));
        assert!(line.contains("0:04:10"));
        assert!(line.contains("0:02:30"));
    }
}
