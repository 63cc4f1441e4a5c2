//! Event Filter
//!
//! A pure predicate over one kill record and the operator's filter
//! configuration. Total by construction: a record missing a field is
//! simply unfiltered for that criterion, so a half-parsed line still has
//! a chance to be shown instead of vanishing.

use serde::{Deserialize, Serialize};

use crate::feed::event::KillEvent;

/// Operator-supplied filter configuration.
///
/// Empty lists and unset options filter nothing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedFilter {
    /// Only kills involving one of these players pass, when non-empty.
    #[serde(default)]
    pub include_players: Vec<String>,
    /// Kills involving any of these players are dropped.
    #[serde(default)]
    pub exclude_players: Vec<String>,
    /// Only these weapons pass, when non-empty.
    #[serde(default)]
    pub allow_weapons: Vec<String>,
    /// Kills with these weapons are dropped.
    #[serde(default)]
    pub deny_weapons: Vec<String>,
    /// Only kills by this team pass, when set.
    #[serde(default)]
    pub team_only: Option<String>,
    /// Drop suicides and friendly fire.
    #[serde(default)]
    pub suppress_low_interest: bool,
}

impl FeedFilter {
    /// Read the filter configuration from the environment.
    ///
    /// List values are comma-separated names.
    pub fn from_env() -> Self {
        Self {
            include_players: env_list("KILLFEED_INCLUDE_PLAYERS"),
            exclude_players: env_list("KILLFEED_EXCLUDE_PLAYERS"),
            allow_weapons: env_list("KILLFEED_ALLOW_WEAPONS"),
            deny_weapons: env_list("KILLFEED_DENY_WEAPONS"),
            team_only: std::env::var("KILLFEED_TEAM_ONLY")
                .ok()
                .filter(|v| !v.is_empty()),
            suppress_low_interest: std::env::var("KILLFEED_SUPPRESS_LOW_INTEREST")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn list_has(list: &[String], name: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(name))
}

/// Decide whether a kill record should reach consumers.
///
/// Never fails and never mutates; missing optional fields pass each
/// criterion they would be needed for.
pub fn should_forward(event: &KillEvent, filter: &FeedFilter) -> bool {
    let killer = event.killer.as_deref();
    let victim = event.victim.as_deref();

    if !filter.include_players.is_empty() {
        let involved = [killer, victim]
            .into_iter()
            .flatten()
            .any(|name| list_has(&filter.include_players, name));
        // Only enforceable when at least one name is present.
        if (killer.is_some() || victim.is_some()) && !involved {
            return false;
        }
    }

    if [killer, victim]
        .into_iter()
        .flatten()
        .any(|name| list_has(&filter.exclude_players, name))
    {
        return false;
    }

    if let Some(weapon) = event.weapon.as_deref() {
        if !filter.allow_weapons.is_empty() && !list_has(&filter.allow_weapons, weapon) {
            return false;
        }
        if list_has(&filter.deny_weapons, weapon) {
            return false;
        }
    }

    if let (Some(team), Some(killer_team)) = (filter.team_only.as_deref(), event.killer_team.as_deref()) {
        if !killer_team.eq_ignore_ascii_case(team) {
            return false;
        }
    }

    if filter.suppress_low_interest && (event.is_suicide() || event.is_friendly_fire()) {
        return false;
    }

    true
}
