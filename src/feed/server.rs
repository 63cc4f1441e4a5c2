//! Feed WebSocket Server
//!
//! The consumers' front door: accepts WebSocket connections, registers
//! each one in the fanout hub under a fresh session id, and forwards
//! broadcast frames. Consumers only ever receive; the two requests they
//! may send are a ping and a filter-config query.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::feed::filter::FeedFilter;
use crate::feed::hub::FanoutHub;
use crate::feed::protocol::{ConsumerRequest, FeedFrame};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct FeedServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent consumers.
    pub max_connections: usize,
}

impl Default for FeedServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            max_connections: 256,
        }
    }
}

impl FeedServerConfig {
    /// Read settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("KILLFEED_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("KILLFEED_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
        }
    }
}

/// Feed server errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The feed server.
pub struct FeedServer {
    config: FeedServerConfig,
    hub: Arc<FanoutHub>,
    filter: FeedFilter,
    shutdown_tx: broadcast::Sender<()>,
}

impl FeedServer {
    /// Create a server around an existing hub.
    pub fn new(config: FeedServerConfig, hub: Arc<FanoutHub>, filter: FeedFilter) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            hub,
            filter,
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), FeedServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("feed server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.hub.consumer_count().await >= self.config.max_connections {
                                warn!("consumer limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new feed connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => error!("accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("feed server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one consumer connection for its lifetime.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = self.hub.clone();
        let filter = self.filter.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (consumer_id, mut frames) = hub.connect().await;
            info!(consumer = %consumer_id, "feed consumer connected from {}", addr);

            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        let frame = match frame {
                            Some(f) => f,
                            None => break,
                        };
                        let text = match frame.to_json() {
                            Ok(t) => t,
                            Err(e) => {
                                error!("failed to serialize frame: {}", e);
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ConsumerRequest::from_json(&text) {
                                    Ok(ConsumerRequest::Ping { timestamp }) => {
                                        hub.send_to(consumer_id, FeedFrame::Pong { timestamp }).await;
                                    }
                                    Ok(ConsumerRequest::Filters) => {
                                        hub.send_to(
                                            consumer_id,
                                            FeedFrame::Filters { config: filter.clone() },
                                        )
                                        .await;
                                    }
                                    Err(e) => debug!("ignoring invalid request from {}: {}", addr, e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("consumer {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            hub.disconnect(consumer_id).await;
            info!(consumer = %consumer_id, "feed consumer cleaned up");
        });
    }

    /// Signal the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Connected consumer count.
    pub async fn consumer_count(&self) -> usize {
        self.hub.consumer_count().await
    }
}
