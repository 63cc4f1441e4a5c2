//! Game-State Source Boundary
//!
//! The external control API is a thin collaborator: it answers "get live
//! status" and accepts best-effort server messages, authenticated with a
//! bearer credential. This module owns the trait boundary, the session
//! resource a clock holds, and the credential config; the simulated
//! implementation used by the demo driver and tests lives in [`sim`].

pub mod sim;

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Whether the last poll reached the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Last poll succeeded.
    Connected,
    /// No session, or the last poll failed.
    Disconnected,
}

/// One poll's worth of live game state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    /// Current map name.
    pub map: String,
    /// Players on the server.
    pub players: u32,
    /// Remaining in-game time in seconds; 0 when the source has none.
    pub remaining_secs: u32,
}

/// Source boundary errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source was unreachable or the request failed in transit.
    #[error("transport error: {0}")]
    Transport(String),

    /// The bearer credential was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The session was already released.
    #[error("session closed")]
    Closed,
}

/// A live connection to the game-state source.
///
/// Object-safe so sessions can be stored in a clock regardless of the
/// backing implementation; async methods are expressed as boxed futures.
/// `Sync` is required because clocks live behind shared locks that cross
/// task boundaries; all methods still take `&mut self`.
pub trait GameStateSource: Send + Sync {
    /// Poll current live state.
    fn live_status(&mut self) -> BoxFuture<'_, Result<LiveStatus, SourceError>>;

    /// Send a chat line to the game server.
    ///
    /// Some server versions have no message endpoint; that is reported as
    /// `Ok(false)`, never as an error.
    fn send_server_message(&mut self, text: String) -> BoxFuture<'_, Result<bool, SourceError>>;

    /// Tear down the connection.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Establishes sessions; used at match start and for reconnects.
pub trait SourceConnector: Send + Sync {
    /// Open a fresh session against the source.
    fn connect(&self) -> BoxFuture<'_, Result<SourceSession, SourceError>>;
}

/// A scoped session resource, owned exclusively by one clock.
///
/// Wraps the source connection so release happens at most once: `close`
/// takes the inner connection out, and every later call observes `Closed`.
pub struct SourceSession {
    inner: Option<Box<dyn GameStateSource>>,
}

impl std::fmt::Debug for SourceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSession")
            .field("connected", &self.inner.is_some())
            .finish()
    }
}

impl SourceSession {
    /// Wrap a freshly-connected source.
    pub fn new(source: Box<dyn GameStateSource>) -> Self {
        Self {
            inner: Some(source),
        }
    }

    /// Poll current live state.
    pub async fn live_status(&mut self) -> Result<LiveStatus, SourceError> {
        match self.inner.as_mut() {
            Some(source) => source.live_status().await,
            None => Err(SourceError::Closed),
        }
    }

    /// Send a chat line to the game server, best-effort.
    pub async fn send_server_message(&mut self, text: &str) -> Result<bool, SourceError> {
        match self.inner.as_mut() {
            Some(source) => source.send_server_message(text.to_string()).await,
            None => Err(SourceError::Closed),
        }
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut source) = self.inner.take() {
            source.close().await;
            debug!("source session released");
        }
    }

    /// Whether the session still holds a live connection.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl Drop for SourceSession {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!("source session dropped without explicit close");
        }
    }
}

/// Connection settings for the game-state source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Base URL of the control API.
    pub base_url: String,
    /// Bearer credential attached to every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8010".into(),
            api_key: String::new(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl SourceConfig {
    /// Read settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GAME_API_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("GAME_API_KEY").unwrap_or_default(),
            timeout: std::env::var("GAME_API_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Short credential fingerprint, safe to log.
    pub fn key_fingerprint(&self) -> String {
        if self.api_key.is_empty() {
            return "unset".into();
        }
        let digest = Sha256::digest(self.api_key.as_bytes());
        hex::encode(&digest[..4])
    }
}
