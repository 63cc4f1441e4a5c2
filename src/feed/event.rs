//! Kill Records
//!
//! The upstream log classifier is best-effort: any field can be missing on
//! a malformed line, so everything is optional and downstream code decides
//! how lenient to be.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One kill reported by the game log classifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    /// Acting player name.
    #[serde(default)]
    pub killer: Option<String>,
    /// Victim player name.
    #[serde(default)]
    pub victim: Option<String>,
    /// Weapon name, if the line carried one.
    #[serde(default)]
    pub weapon: Option<String>,
    /// Killer's team, if known.
    #[serde(default)]
    pub killer_team: Option<String>,
    /// Victim's team, if known.
    #[serde(default)]
    pub victim_team: Option<String>,
    /// When the kill happened, if the line carried a timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl KillEvent {
    /// Killer and victim are the same player. Unknown names never match.
    pub fn is_suicide(&self) -> bool {
        match (&self.killer, &self.victim) {
            (Some(k), Some(v)) => k.eq_ignore_ascii_case(v),
            _ => false,
        }
    }

    /// Both teams known and equal.
    pub fn is_friendly_fire(&self) -> bool {
        match (&self.killer_team, &self.victim_team) {
            (Some(k), Some(v)) => k.eq_ignore_ascii_case(v) && !self.is_suicide(),
            _ => false,
        }
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill(killer: &str, victim: &str) -> KillEvent {
        KillEvent {
            killer: Some(killer.into()),
            victim: Some(victim.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_suicide_detection() {
        assert!(kill("Player", "player").is_suicide());
        assert!(!kill("Player", "Other").is_suicide());
        assert!(!KillEvent::default().is_suicide());
    }

    #[test]
    fn test_friendly_fire_detection() {
        let mut event = kill("A", "B");
        event.killer_team = Some("Allies".into());
        event.victim_team = Some("allies".into());
        assert!(event.is_friendly_fire());

        event.victim_team = Some("Axis".into());
        assert!(!event.is_friendly_fire());

        // Unknown teams never count as friendly fire.
        event.victim_team = None;
        assert!(!event.is_friendly_fire());
    }

    #[test]
    fn test_binary_roundtrip() {
        let event = KillEvent {
            killer: Some("Actor".into()),
            victim: Some("Target".into()),
            weapon: Some("M1 GARAND".into()),
            killer_team: Some("Allies".into()),
            victim_team: Some("Axis".into()),
            timestamp: None,
        };
        let bytes = event.to_bytes().unwrap();
        assert_eq!(KillEvent::from_bytes(&bytes).unwrap(), event);
    }

    #[test]
    fn test_partial_json_deserializes() {
        let event: KillEvent = serde_json::from_str(r#"{"killer": "Someone"}"#).unwrap();
        assert_eq!(event.killer.as_deref(), Some("Someone"));
        assert!(event.weapon.is_none());
    }
}
