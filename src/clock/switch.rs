//! Switch Engine
//!
//! Applies a control-change event to a clock: credits the open session to
//! the side that held the point and hands the point to the new side. The
//! engine only mutates the ledger; announcing new totals to the game server
//! is the caller's job.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::clock::state::{ClockState, Side, SwitchMethod, SwitchRecord};
use crate::MAX_PLAUSIBLE_SWITCH_GAP_SECS;

/// What a single switch did to the ledger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwitchOutcome {
    /// True when this was the first switch (clock start, nothing credited).
    pub first_switch: bool,
    /// Side and seconds credited by this switch, if any.
    pub credited: Option<(Side, f64)>,
    /// Elapsed value that failed the plausibility check, if any.
    pub rejected_elapsed: Option<f64>,
}

/// Switch point control to `new_side` at `now`.
///
/// The first switch starts the clock and credits nothing. Later switches
/// credit `now - last_switch_at` to the previously active side, unless the
/// elapsed time is negative or above the sanity ceiling. Stale or skewed
/// timestamps must not corrupt the ledger, so the credit (and only the
/// credit) is discarded. Same-side switches get no special casing: the
/// near-zero elapsed goes to the side that already held the point.
pub fn switch_to(
    clock: &mut ClockState,
    new_side: Side,
    now: DateTime<Utc>,
    method: SwitchMethod,
) -> SwitchOutcome {
    let record = SwitchRecord {
        from_side: clock.active_side,
        to_side: new_side,
        timestamp: now,
        method,
    };

    if !clock.clock_started {
        clock.clock_started = true;
        clock.active_side = Some(new_side);
        clock.last_switch_at = Some(now);
        clock.record_switch(record);
        info!(side = %new_side, ?method, "first switch, control clock started");
        return SwitchOutcome {
            first_switch: true,
            credited: None,
            rejected_elapsed: None,
        };
    }

    let (credited, rejected) = match credit_open_session(clock, now) {
        Ok(c) => (c, None),
        Err(elapsed) => (None, Some(elapsed)),
    };

    clock.active_side = Some(new_side);
    clock.last_switch_at = Some(now);
    clock.record_switch(record);

    SwitchOutcome {
        first_switch: false,
        credited,
        rejected_elapsed: rejected,
    }
}

/// Credit the open session to the side currently holding the point.
///
/// Shared by the switch engine and the finalizer so the same plausibility
/// rules guard both paths. `Ok(None)` when no side holds the point,
/// `Err(elapsed)` when the elapsed time failed the check (the ledger is
/// left untouched).
pub(crate) fn credit_open_session(
    clock: &mut ClockState,
    now: DateTime<Utc>,
) -> Result<Option<(Side, f64)>, f64> {
    let (holder, last) = match (clock.active_side, clock.last_switch_at) {
        (Some(holder), Some(last)) => (holder, last),
        _ => return Ok(None),
    };

    let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
    if !(0.0..=MAX_PLAUSIBLE_SWITCH_GAP_SECS).contains(&elapsed) {
        warn!(
            elapsed_secs = elapsed,
            side = %holder,
            "implausible elapsed time, not crediting"
        );
        return Err(elapsed);
    }

    clock.credit(holder, elapsed);
    info!(
        side = %holder,
        credited_secs = elapsed,
        total_secs = clock.time(holder),
        "credited control time"
    );
    Ok(Some((holder, elapsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_switch_credits_nothing() {
        let mut clock = ClockState::new(t(0));
        let outcome = switch_to(&mut clock, Side::Allies, t(5), SwitchMethod::Manual);

        assert!(outcome.first_switch);
        assert_eq!(outcome.credited, None);
        assert!(clock.clock_started);
        assert_eq!(clock.active_side, Some(Side::Allies));
        assert_eq!(clock.last_switch_at, Some(t(5)));
        assert_eq!(clock.time(Side::Allies), 0.0);
        assert_eq!(clock.switch_count(), 1);
        assert_eq!(clock.history()[0].from_side, None);
    }

    #[test]
    fn test_switch_credits_previous_holder() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        let outcome = switch_to(&mut clock, Side::Axis, t(100), SwitchMethod::Manual);

        assert_eq!(outcome.credited, Some((Side::Allies, 100.0)));
        assert_eq!(clock.time(Side::Allies), 100.0);
        assert_eq!(clock.time(Side::Axis), 0.0);
        assert_eq!(clock.active_side, Some(Side::Axis));
    }

    #[test]
    fn test_same_side_switch_not_special_cased() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        let outcome = switch_to(&mut clock, Side::Allies, t(30), SwitchMethod::Auto);

        assert_eq!(outcome.credited, Some((Side::Allies, 30.0)));
        assert_eq!(clock.time(Side::Allies), 30.0);
        assert_eq!(clock.switch_count(), 2);
    }

    #[test]
    fn test_negative_elapsed_rejected() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Allies, t(100), SwitchMethod::Manual);
        let outcome = switch_to(&mut clock, Side::Axis, t(40), SwitchMethod::Manual);

        assert!(outcome.credited.is_none());
        assert_eq!(outcome.rejected_elapsed, Some(-60.0));
        assert_eq!(clock.time(Side::Allies), 0.0);
        assert_eq!(clock.time(Side::Axis), 0.0);
        // The side change itself still goes through.
        assert_eq!(clock.active_side, Some(Side::Axis));
    }

    #[test]
    fn test_elapsed_above_ceiling_rejected() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Axis, t(0), SwitchMethod::Manual);
        let outcome = switch_to(&mut clock, Side::Allies, t(14_401), SwitchMethod::Manual);

        assert!(outcome.credited.is_none());
        assert_eq!(outcome.rejected_elapsed, Some(14_401.0));
        assert_eq!(clock.time(Side::Axis), 0.0);
    }

    #[test]
    fn test_elapsed_at_ceiling_accepted() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Axis, t(0), SwitchMethod::Manual);
        let outcome = switch_to(&mut clock, Side::Allies, t(14_400), SwitchMethod::Manual);

        assert_eq!(outcome.credited, Some((Side::Axis, 14_400.0)));
    }

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let mut clock = ClockState::new(t(0));
        switch_to(&mut clock, Side::Allies, t(0), SwitchMethod::Manual);
        switch_to(&mut clock, Side::Axis, t(10), SwitchMethod::Auto);
        switch_to(&mut clock, Side::Allies, t(25), SwitchMethod::Manual);

        let stamps: Vec<_> = clock.history().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![t(0), t(10), t(25)]);
        assert_eq!(clock.history()[1].from_side, Some(Side::Allies));
        assert_eq!(clock.history()[2].method, SwitchMethod::Manual);
    }

    proptest! {
        /// The sum of both totals equals the sum of all accepted inter-switch
        /// gaps, for any valid switch script.
        #[test]
        fn prop_totals_equal_accepted_gaps(
            gaps in proptest::collection::vec(0u32..20_000, 1..40),
            sides in proptest::collection::vec(any::<bool>(), 40),
        ) {
            let mut clock = ClockState::new(t(0));
            let mut at = 0i64;
            let mut expected = 0.0f64;

            switch_to(
                &mut clock,
                if sides[0] { Side::Allies } else { Side::Axis },
                t(0),
                SwitchMethod::Manual,
            );

            for (i, gap) in gaps.iter().enumerate() {
                at += *gap as i64;
                if *gap as f64 <= MAX_PLAUSIBLE_SWITCH_GAP_SECS {
                    expected += *gap as f64;
                }
                let side = if sides[(i + 1) % sides.len()] { Side::Allies } else { Side::Axis };
                switch_to(&mut clock, side, t(at), SwitchMethod::Auto);
            }

            let total = clock.time(Side::Allies) + clock.time(Side::Axis);
            prop_assert!((total - expected).abs() < 1e-6);
            prop_assert!(clock.time(Side::Allies) >= 0.0);
            prop_assert!(clock.time(Side::Axis) >= 0.0);
        }
    }
}
