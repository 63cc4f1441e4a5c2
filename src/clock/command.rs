//! Control Commands
//!
//! Operator actions arrive as an explicit command enum and go through a
//! pure dispatch step: permissions and clock state in, ledger mutation and
//! a list of side effects out. The async `execute` wrapper applies those
//! effects (game announcements, notifications, session release) so the
//! transition logic stays independent of any presentation layer.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::finalize::{finalize, MatchSummary, StopReason};
use crate::clock::registry::{ChannelId, ClockRegistry};
use crate::clock::state::{format_control_time, ClockState, Side, SwitchMethod};
use crate::clock::switch::switch_to;
use crate::notify::{Notification, Notifier};
use crate::source::{SourceConnector, SourceSession};

/// Timeout on one in-game announcement.
const ANNOUNCE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// An operator action against one match clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start the match.
    Start,
    /// Hand point control to a side.
    Switch(Side),
    /// Toggle automated switching from the live feed.
    ToggleAutoSwitch,
    /// Stop the match and produce the result.
    Stop,
    /// Discard the clock and allocate a fresh one.
    Reset,
}

/// What the acting user is allowed to do.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActorPermissions {
    /// Operators may issue control commands.
    pub operator: bool,
}

impl ActorPermissions {
    /// Permissions of an operator.
    pub fn operator() -> Self {
        Self { operator: true }
    }

    /// Permissions of a regular viewer.
    pub fn viewer() -> Self {
        Self { operator: false }
    }
}

/// Rejections surfaced to the acting user. The clock is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Actor lacks the operator role.
    #[error("operator role required")]
    NotPermitted,

    /// Command needs a running match.
    #[error("match not started")]
    NotStarted,

    /// Start issued while a match is already running.
    #[error("match already started")]
    AlreadyStarted,
}

/// A side effect for the executor to apply.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandEffect {
    /// Announce a line in-game, best-effort.
    AnnounceInGame(String),
    /// Push a fresh display summary to the match channel.
    RefreshDisplay,
    /// Publish a final result.
    PublishResult(MatchSummary),
}

/// Everything a dispatch produced besides the ledger mutation itself.
#[derive(Default, Debug)]
pub struct DispatchOutcome {
    /// Effects in application order.
    pub effects: Vec<CommandEffect>,
    /// Session taken out of the clock; the executor must release it.
    pub released_session: Option<SourceSession>,
    /// The executor should acquire a source session for this clock.
    pub connect: bool,
    /// The executor should replace this clock with a fresh one.
    pub reset: bool,
}

/// Apply a control command to the clock.
///
/// Pure over the clock: no I/O happens here. Authorization is checked
/// before any mutation.
pub fn dispatch(
    command: ControlCommand,
    actor: &ActorPermissions,
    clock: &mut ClockState,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome, CommandError> {
    if !actor.operator {
        return Err(CommandError::NotPermitted);
    }

    let mut outcome = DispatchOutcome::default();

    match command {
        ControlCommand::Start => {
            if clock.started {
                return Err(CommandError::AlreadyStarted);
            }
            clock.started = true;
            clock.match_start_time = now;
            info!("match started");
            outcome.connect = true;
            outcome.effects.push(CommandEffect::AnnounceInGame(
                "Match started! Center point control timer active.".into(),
            ));
            outcome.effects.push(CommandEffect::RefreshDisplay);
        }

        ControlCommand::Switch(side) => {
            if !clock.started {
                return Err(CommandError::NotStarted);
            }
            switch_to(clock, side, now, SwitchMethod::Manual);
            // Accumulated times only; the open session would just confuse
            // readers mid-switch.
            outcome.effects.push(CommandEffect::AnnounceInGame(format!(
                "{} captured the center point! | Allies: {} | Axis: {}",
                side,
                format_control_time(clock.time(Side::Allies)),
                format_control_time(clock.time(Side::Axis)),
            )));
            outcome.effects.push(CommandEffect::RefreshDisplay);
        }

        ControlCommand::ToggleAutoSwitch => {
            clock.auto_switch_enabled = !clock.auto_switch_enabled;
            let status = if clock.auto_switch_enabled {
                "enabled"
            } else {
                "disabled"
            };
            info!(status, "auto-switch toggled");
            outcome
                .effects
                .push(CommandEffect::AnnounceInGame(format!("Auto-switch {status}")));
            outcome.effects.push(CommandEffect::RefreshDisplay);
        }

        ControlCommand::Stop => {
            if !clock.started {
                return Err(CommandError::NotStarted);
            }
            let result = finalize(clock, now, StopReason::Manual);
            outcome
                .effects
                .push(CommandEffect::AnnounceInGame(result.summary.announcement()));
            outcome
                .effects
                .push(CommandEffect::PublishResult(result.summary));
            outcome.released_session = result.session;
        }

        ControlCommand::Reset => {
            outcome.released_session = clock.take_session();
            outcome.reset = true;
            outcome.effects.push(CommandEffect::RefreshDisplay);
        }
    }

    Ok(outcome)
}

/// Run a command end to end: dispatch under the clock's lock, then apply
/// the side effects.
pub async fn execute(
    registry: &ClockRegistry,
    notifier: &Notifier,
    connector: &dyn SourceConnector,
    channel: ChannelId,
    command: ControlCommand,
    actor: &ActorPermissions,
    now: DateTime<Utc>,
) -> Result<(), CommandError> {
    let clock_arc = registry.get_or_create(channel, now).await;
    let mut clock = clock_arc.write().await;

    let outcome = dispatch(command, actor, &mut clock, now)?;
    let mut released = outcome.released_session;

    if outcome.connect && clock.session.is_none() {
        match connector.connect().await {
            Ok(session) => {
                clock.session = Some(session);
                info!(channel, "source session established");
            }
            Err(err) => warn!(channel, %err, "source connection failed at start"),
        }
    }

    for effect in outcome.effects {
        match effect {
            CommandEffect::AnnounceInGame(text) => {
                // A stop takes the session out of the clock first; announce
                // through whichever handle is still live.
                let target = match clock.session.as_mut() {
                    Some(session) => Some(session),
                    None => released.as_mut(),
                };
                match target {
                    Some(session) => match tokio::time::timeout(
                        ANNOUNCE_TIMEOUT,
                        session.send_server_message(&text),
                    )
                    .await
                    {
                        Ok(Ok(true)) => {}
                        Ok(Ok(false)) => debug!("server has no message endpoint, skipping announce"),
                        Ok(Err(err)) => warn!(%err, "failed to announce in game"),
                        Err(_) => warn!("in-game announce timed out"),
                    },
                    None => debug!("no source session, skipping announce"),
                }
            }
            CommandEffect::RefreshDisplay => {
                notifier.publish(Notification::Display(clock.display_summary(now)));
            }
            CommandEffect::PublishResult(summary) => notifier.publish_result(summary),
        }
    }

    if let Some(mut session) = released {
        session.close().await;
    }
    drop(clock);

    if outcome.reset {
        if let Some(mut leftover) = registry.reset(channel, now).await {
            leftover.close().await;
        }
        let fresh = registry.get_or_create(channel, now).await;
        let clock = fresh.read().await;
        notifier.publish(Notification::Display(clock.display_summary(now)));
    }

    Ok(())
}
