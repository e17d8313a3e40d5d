//! # parley-relay
//!
//! Parley relay binary: loads settings, connects the backplane and serves
//! rooms over HTTP/WebSocket until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_backplane::{Backplane, RedisBackplane};
use parley_server::{ParleyServer, RoomRegistry};
use parley_settings::{BackplaneSettings, ParleySettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Realtime room relay.
#[derive(Parser, Debug)]
#[command(name = "parley-relay", about = "Realtime room relay")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Name this process publishes under on the fan-out channel.
    #[arg(long)]
    instance: Option<String>,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a subscriber is already set
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

/// Settings file, then env, then CLI flags.
fn resolve_settings(cli: &Cli) -> Result<ParleySettings> {
    let mut settings = match &cli.config {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => parley_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

/// Connect Redis when configured, otherwise (or on failure) fall back to
/// process-local history without fan-out.
async fn build_backplane(settings: &BackplaneSettings, instance: &str) -> Backplane {
    let Some(url) = &settings.redis_url else {
        return local_backplane(settings);
    };
    match RedisBackplane::connect(url, instance, settings.history_limit).await {
        Ok(redis) => {
            info!(instance, "using redis backplane");
            apply_toggles(Backplane::redis(redis), settings)
        }
        Err(e) => {
            warn!(error = %e, "redis unavailable, falling back to in-memory history without fan-out");
            local_backplane(settings)
        }
    }
}

fn local_backplane(settings: &BackplaneSettings) -> Backplane {
    apply_toggles(Backplane::in_memory(settings.history_limit), settings)
}

fn apply_toggles(backplane: Backplane, settings: &BackplaneSettings) -> Backplane {
    let history = backplane.history.clone().filter(|_| settings.history_enabled);
    let fanout = backplane.fanout.clone().filter(|_| settings.fanout_enabled);
    backplane.with_history(history).with_fanout(fanout)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    let settings = resolve_settings(&cli)?;
    let instance = cli
        .instance
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let backplane = build_backplane(&settings.backplane, &instance).await;
    info!(?backplane, "backplane ready");
    let registry = RoomRegistry::new(&settings.rooms, backplane);

    let mut server = ParleyServer::new(settings, registry);
    match parley_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder unavailable"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(%addr, instance = %instance, "parley relay listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    let _ = server.shutdown().drain(handle).await;
    info!("shutdown complete");
    Ok(())
}
