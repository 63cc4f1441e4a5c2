//! Feed Wire Protocol
//!
//! Frames exchanged with feed consumers over WebSocket, as JSON. Binary
//! encoding stays on the flat [`KillEvent`](crate::feed::event::KillEvent)
//! struct; tagged enums and bincode do not mix.

use serde::{Deserialize, Serialize};

use crate::feed::event::KillEvent;
use crate::feed::filter::FeedFilter;

/// Frames pushed from the feed server to consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedFrame {
    /// A kill that passed the filter.
    Kill {
        /// The kill record.
        payload: KillEvent,
    },
    /// The active filter configuration, on request.
    Filters {
        /// Current configuration.
        config: FeedFilter,
    },
    /// Reply to a consumer ping.
    Pong {
        /// Echoed consumer timestamp.
        timestamp: u64,
    },
}

/// Requests consumers may send; everything else is ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsumerRequest {
    /// Latency probe.
    Ping {
        /// Consumer timestamp to echo back.
        timestamp: u64,
    },
    /// Ask for the active filter configuration.
    Filters,
}

impl FeedFrame {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ConsumerRequest {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_frame_json_roundtrip() {
        let frame = FeedFrame::Kill {
            payload: KillEvent {
                killer: Some("Actor".into()),
                victim: Some("Target".into()),
                weapon: Some("MP40".into()),
                ..Default::default()
            },
        };

        let json = frame.to_json().unwrap();
        assert!(json.contains(r#""type":"kill""#));

        match FeedFrame::from_json(&json).unwrap() {
            FeedFrame::Kill { payload } => {
                assert_eq!(payload.killer.as_deref(), Some("Actor"));
                assert_eq!(payload.weapon.as_deref(), Some("MP40"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_consumer_request_parses() {
        let request = ConsumerRequest::from_json(r#"{"type":"ping","timestamp":42}"#).unwrap();
        assert!(matches!(request, ConsumerRequest::Ping { timestamp: 42 }));

        let request = ConsumerRequest::from_json(r#"{"type":"filters"}"#).unwrap();
        assert!(matches!(request, ConsumerRequest::Filters));
    }

    #[test]
    fn test_unknown_request_is_an_error() {
        assert!(ConsumerRequest::from_json(r#"{"type":"subscribe"}"#).is_err());
    }
}
