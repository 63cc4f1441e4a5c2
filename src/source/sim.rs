//! Simulated Game-State Source
//!
//! A scripted stand-in for the live control API, driven by tests and the
//! demo match in `main`. One [`SimulatedWorld`] is shared by every session
//! and connector cloned from it, so a test can flip the world offline and
//! watch reconnect behavior, or count down the game clock and watch the
//! auto-stop fire.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use super::{GameStateSource, LiveStatus, SourceConnector, SourceError, SourceSession};

#[derive(Debug)]
struct WorldState {
    map: String,
    players: u32,
    remaining_secs: u32,
    online: bool,
    message_endpoint: bool,
    messages: Vec<String>,
}

/// Shared scripted world backing simulated sessions.
#[derive(Clone)]
pub struct SimulatedWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimulatedWorld {
    /// A healthy world on an unnamed map with an empty server.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                map: "Unknown".into(),
                players: 0,
                remaining_secs: 0,
                online: true,
                message_endpoint: true,
                messages: Vec::new(),
            })),
        }
    }

    /// Set the current map name.
    pub fn set_map(&self, map: &str) {
        self.state.lock().unwrap().map = map.to_string();
    }

    /// Set the player count.
    pub fn set_players(&self, players: u32) {
        self.state.lock().unwrap().players = players;
    }

    /// Set the remaining in-game time.
    pub fn set_remaining(&self, secs: u32) {
        self.state.lock().unwrap().remaining_secs = secs;
    }

    /// Take the world offline (polls and connects fail) or back online.
    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    /// Pretend this server version has no message endpoint.
    pub fn disable_message_endpoint(&self) {
        self.state.lock().unwrap().message_endpoint = false;
    }

    /// Every server message accepted so far.
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Open a session against this world directly.
    pub fn session(&self) -> SourceSession {
        SourceSession::new(Box::new(SimulatedSource {
            world: self.clone(),
        }))
    }

    /// A connector handing out sessions against this world.
    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector {
            world: self.clone(),
        }
    }
}

impl Default for SimulatedWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Session half of the simulated source.
pub struct SimulatedSource {
    world: SimulatedWorld,
}

impl GameStateSource for SimulatedSource {
    fn live_status(&mut self) -> BoxFuture<'_, Result<LiveStatus, SourceError>> {
        Box::pin(async move {
            let state = self.world.state.lock().unwrap();
            if !state.online {
                return Err(SourceError::Transport("simulated outage".into()));
            }
            Ok(LiveStatus {
                map: state.map.clone(),
                players: state.players,
                remaining_secs: state.remaining_secs,
            })
        })
    }

    fn send_server_message(&mut self, text: String) -> BoxFuture<'_, Result<bool, SourceError>> {
        Box::pin(async move {
            let mut state = self.world.state.lock().unwrap();
            if !state.online {
                return Err(SourceError::Transport("simulated outage".into()));
            }
            if !state.message_endpoint {
                return Ok(false);
            }
            state.messages.push(text);
            Ok(true)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Connector half of the simulated source.
pub struct SimulatedConnector {
    world: SimulatedWorld,
}

impl SourceConnector for SimulatedConnector {
    fn connect(&self) -> BoxFuture<'_, Result<SourceSession, SourceError>> {
        Box::pin(async move {
            if !self.world.state.lock().unwrap().online {
                return Err(SourceError::Transport("simulated outage".into()));
            }
            Ok(self.world.session())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_reflects_world() {
        let world = SimulatedWorld::new();
        world.set_map("Foy");
        world.set_players(84);
        world.set_remaining(900);

        let mut session = world.session();
        let status = session.live_status().await.unwrap();
        assert_eq!(status.map, "Foy");
        assert_eq!(status.players, 84);
        assert_eq!(status.remaining_secs, 900);
    }

    #[tokio::test]
    async fn test_offline_world_fails_polls_and_connects() {
        let world = SimulatedWorld::new();
        world.set_online(false);

        let mut session = world.session();
        assert!(matches!(
            session.live_status().await,
            Err(SourceError::Transport(_))
        ));
        assert!(world.connector().connect().await.is_err());

        world.set_online(true);
        assert!(session.live_status().await.is_ok());
        assert!(world.connector().connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_message_endpoint_is_not_an_error() {
        let world = SimulatedWorld::new();
        world.disable_message_endpoint();

        let mut session = world.session();
        let sent = session.send_server_message("hello").await.unwrap();
        assert!(!sent);
        assert!(world.messages().is_empty());
    }

    #[tokio::test]
    async fn test_messages_are_captured() {
        let world = SimulatedWorld::new();
        let mut session = world.session();
        session.send_server_message("one").await.unwrap();
        session.send_server_message("two").await.unwrap();
        assert_eq!(world.messages(), vec!["one", "two"]);
    }
}
