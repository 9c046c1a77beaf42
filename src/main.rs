//! Fairplay engine service entry point.
//!
//! Runs the engine with in-memory collaborators and streams round events to
//! the log. Production deployments embed the library and wire real
//! collaborators through `EngineBuilder` instead.

use clap::Parser;
use fairplay::history::BroadcastFanout;
use fairplay::{ConfigLoader, GameEngine};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fairplay", about = "Provably-fair game engine service")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter, e.g. "info" or "fairplay=debug".
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let fanout = Arc::new(BroadcastFanout::default());
    let mut events = fanout.subscribe();

    let engine = GameEngine::builder()
        .with_config(config)
        .with_fanout(fanout)
        .build()?;

    let snapshot = engine.round_state().await?;
    tracing::info!(
        round = snapshot.round_number,
        commitment = %snapshot.server_seed_hash,
        "engine up"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok((topic, event)) => tracing::debug!(topic = %topic, event = ?event, "event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
