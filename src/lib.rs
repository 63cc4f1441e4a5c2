//! # Holdpoint Server
//!
//! Match companion for two-side territorial control contests: a per-match
//! control-time clock reconciled against the live game server, plus a kill
//! feed relay for spectator channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HOLDPOINT SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  clock/          - Control-time accrual core                 │
//! │  ├── state.rs    - Per-match ledger and live snapshot        │
//! │  ├── switch.rs   - Control-change engine                     │
//! │  ├── finalize.rs - Winner computation and result summary     │
//! │  ├── command.rs  - Operator command dispatch                 │
//! │  └── registry.rs - Per-channel clocks, per-clock locking     │
//! │                                                              │
//! │  reconcile/      - Periodic sync against the game server     │
//! │  source/         - Game-state source boundary + simulator    │
//! │  notify/         - Fire-and-forget presentation channel      │
//! │                                                              │
//! │  feed/           - Kill feed (independent of the clock)      │
//! │  ├── filter.rs   - Pure per-event predicate                  │
//! │  ├── hub.rs      - Consumer set and broadcast                │
//! │  ├── pipeline.rs - Source channel -> filter -> hub           │
//! │  └── server.rs   - Consumer-facing WebSocket server          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ledger Guarantee
//!
//! The `clock/` module is synchronous and I/O-free. Accrued totals never
//! decrease, every credit passes the same plausibility check, and the
//! registry serializes the reconciliation loop against manual commands per
//! clock, so elapsed time is always computed from the ledger value inside
//! the writer's critical section.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod clock;
pub mod feed;
pub mod notify;
pub mod reconcile;
pub mod source;

// Re-export commonly used types
pub use clock::{ClockRegistry, ClockState, MatchSummary, Side, StopReason, SwitchMethod};
pub use feed::{FanoutHub, FeedFilter, KillEvent};
pub use source::{GameStateSource, LiveStatus, SourceSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default reconciliation period (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 15;

/// Default warm-up before the auto-stop guard is considered (seconds)
pub const DEFAULT_AUTO_STOP_WARMUP_SECS: i64 = 120;

/// Default remaining-game-time threshold for the auto-stop (seconds)
pub const DEFAULT_AUTO_STOP_THRESHOLD_SECS: u32 = 30;

/// Sanity ceiling on a single inter-switch gap (4 hours, in seconds)
pub const MAX_PLAUSIBLE_SWITCH_GAP_SECS: f64 = 14_400.0;
