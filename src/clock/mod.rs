//! Control-time accrual core.
//!
//! One [`ClockState`] per tracked match holds the per-side control-time
//! ledger. The switch engine and finalizer mutate it; everything network-
//! facing lives elsewhere and goes through the registry's per-clock locks.

pub mod command;
pub mod finalize;
pub mod registry;
pub mod state;
pub mod switch;

pub use command::{
    dispatch, execute, ActorPermissions, CommandEffect, CommandError, ControlCommand,
    DispatchOutcome,
};
pub use finalize::{finalize, FinalizeOutcome, MatchSummary, StopReason};
pub use registry::{ChannelId, ClockRegistry};
pub use state::{
    format_control_time, ClockState, DisplaySummary, LiveSnapshot, Side, SwitchMethod,
    SwitchRecord,
};
pub use switch::{switch_to, SwitchOutcome};
