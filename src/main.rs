//! Holdpoint Server
//!
//! Wires the kill feed and runs a scripted demo match against the
//! simulated game-state source, exercising the full clock lifecycle:
//! start, manual switches, reconciliation, and the auto-stop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use holdpoint::clock::{execute, ActorPermissions, ChannelId, ClockRegistry, ControlCommand};
use holdpoint::feed::{run_pipeline, FanoutHub, FeedFilter, FeedServer, FeedServerConfig, KillEvent};
use holdpoint::notify::{Notification, Notifier};
use holdpoint::reconcile::{self, ReconcileConfig};
use holdpoint::source::sim::SimulatedWorld;
use holdpoint::source::SourceConfig;
use holdpoint::{Side, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Holdpoint Server v{}", VERSION);
    let source_config = SourceConfig::from_env();
    info!(
        "Game API: {} (key {})",
        source_config.base_url,
        source_config.key_fingerprint()
    );

    // Kill feed: hub, consumer-facing server, and the filter pipeline.
    let hub = Arc::new(FanoutHub::new());
    let filter = FeedFilter::from_env();
    info!(?filter, "kill feed filter");

    let feed_server = Arc::new(FeedServer::new(
        FeedServerConfig::from_env(),
        hub.clone(),
        filter.clone(),
    ));
    let server = feed_server.clone();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("feed server failed: {}", e);
        }
    });

    let (kill_tx, kill_rx) = mpsc::channel(256);
    let pipeline = tokio::spawn(run_pipeline(kill_rx, filter, hub.clone()));

    demo_match(kill_tx).await?;

    feed_server.shutdown();
    pipeline.await?;
    Ok(())
}

/// Run a scripted match end to end against the simulated source.
async fn demo_match(kill_tx: mpsc::Sender<KillEvent>) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let world = SimulatedWorld::new();
    world.set_map("Carentan");
    world.set_players(64);
    world.set_remaining(600);

    // Startup probe, non-fatal on failure.
    let mut probe = world.session();
    match probe.live_status().await {
        Ok(status) => info!(
            "source probe ok: map {}, {} players, {}s remaining",
            status.map, status.players, status.remaining_secs
        ),
        Err(e) => warn!("source probe failed: {}", e),
    }
    probe.close().await;

    let registry = Arc::new(ClockRegistry::new());
    let (notifier, mut notifications) = Notifier::channel();
    let notifier = Arc::new(notifier);
    let connector = Arc::new(world.connector());

    // Presenter stand-in: log what the chat layer would render.
    let presenter = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::Display(d) => info!(
                    "[display] Allies {} | Axis {} | active {:?} | {} ({} players)",
                    d.time_allies, d.time_axis, d.active_side, d.map, d.players
                ),
                Notification::MatchComplete(s) => info!(
                    "[result] winner {:?}, margin {:.0}s, {} switches ({:?})",
                    s.winner, s.margin_secs, s.switches, s.reason
                ),
            }
        }
    });

    let operator = ActorPermissions::operator();
    let channel: ChannelId = 1;

    execute(
        &registry,
        &notifier,
        connector.as_ref(),
        channel,
        ControlCommand::Start,
        &operator,
        Utc::now(),
    )
    .await?;

    // Short cadence for the demo; production uses ReconcileConfig::from_env.
    let config = ReconcileConfig {
        interval: Duration::from_secs(2),
        warmup_secs: 8,
        ..ReconcileConfig::from_env()
    };
    let loop_task = tokio::spawn(reconcile::run(
        registry.clone(),
        notifier.clone(),
        connector.clone(),
        channel,
        config,
    ));

    let script = [
        (Side::Allies, "Ober", "Schmidt", "M1 GARAND"),
        (Side::Axis, "Schmidt", "Miller", "KAR98"),
        (Side::Allies, "Miller", "Weber", "THOMPSON"),
    ];
    for (side, killer, victim, weapon) in script {
        execute(
            &registry,
            &notifier,
            connector.as_ref(),
            channel,
            ControlCommand::Switch(side),
            &operator,
            Utc::now(),
        )
        .await?;

        let _ = kill_tx
            .send(KillEvent {
                killer: Some(killer.into()),
                victim: Some(victim.into()),
                weapon: Some(weapon.into()),
                ..Default::default()
            })
            .await;

        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    drop(kill_tx);

    // In-game clock runs out; the next reconcile tick auto-stops the match.
    world.set_remaining(25);
    if tokio::time::timeout(Duration::from_secs(30), loop_task)
        .await
        .is_err()
    {
        error!("reconcile loop did not finish in time");
    }

    info!("=== Demo Match Results ===");
    for message in world.messages() {
        info!("[in-game] {}", message);
    }

    drop(notifier);
    let _ = presenter.await;
    Ok(())
}
