//! coord-lock - locks GPS coordinates read off a screen by text recognition
//!
//! Samples a recognized-text stream, stabilizes successive readings and
//! commits a lock once the same coordinate has been read consistently.
//!
//! Module structure:
//! - `domain/` - Core types (Candidate, LockEvent, LogEntry)
//! - `io/` - External interfaces (recognizer, sinks, geocoder, session log)
//! - `services/` - Pipeline logic (parser, stabilizer, dispatcher, sampler)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::{bail, Context};
use clap::Parser;
use coord_lock::infra::{Config, Metrics};
use coord_lock::io::commands::spawn_stdin_reader;
use coord_lock::io::{
    NoHaptic, NominatimGeocoder, RecognitionConfig, ReplaySource, TextSource, TracingDisplay,
};
use coord_lock::services::{create_enrich_worker, Sampler, Session};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// coord-lock - OCR coordinate stabilization and lock logging
#[derive(Parser, Debug)]
#[command(name = "coord-lock", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Replay recorded recognizer output (one frame per line)
    #[arg(short, long)]
    replay: Option<String>,

    /// CSV path written on shutdown (overrides config)
    #[arg(short, long)]
    export: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Default: INFO, use RUST_LOG=debug for per-tick visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "coord_lock_starting");

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(ref replay) = args.replay {
        config = config.with_replay_file(replay);
    }
    if let Some(ref export) = args.export {
        config = config.with_export_csv(export);
    }

    info!(
        config_file = %config.config_file(),
        interval_ms = %config.interval_ms(),
        grow_step = %config.grow_step(),
        decay_step = %config.decay_step(),
        tokenizer = ?config.parser_settings().tokenizer,
        decimal_correction = ?config.parser_settings().decimal_correction,
        axis_swap = %config.axis_swap(),
        geocoder_enabled = %config.geocoder_enabled(),
        export_csv = ?config.export_csv(),
        "config_loaded"
    );

    // Frame source: collaborator failures here are fatal to the session
    let Some(replay_file) = config.replay_file() else {
        bail!("no frame source configured: set sampling.replay_file or pass --replay");
    };
    let source = ReplaySource::from_file(replay_file)?
        .with_latency(config.replay_latency())
        .looped(config.replay_loop());
    let source: Arc<dyn TextSource> = Arc::new(source);
    source
        .configure(&RecognitionConfig::default())
        .await
        .context("Failed to configure text recognition")?;

    let metrics = Arc::new(Metrics::new());
    let mut session =
        Session::from_config(&config, Arc::new(TracingDisplay), Arc::new(NoHaptic), metrics.clone());

    // Address enrichment (optional, off the lock path)
    let enrich_rx = if config.geocoder_enabled() {
        let geocoder = NominatimGeocoder::new(
            config.geocoder_url(),
            config.geocoder_timeout(),
            config.geocoder_user_agent(),
        )
        .context("Failed to build reverse geocoder")?;
        let (enrich_tx, enrich_rx, worker) =
            create_enrich_worker(Arc::new(geocoder), metrics.clone(), config.geocoder_queue_size());
        tokio::spawn(worker.run());
        session = session.with_enrichment(enrich_tx);
        Some(enrich_rx)
    } else {
        None
    };

    // Operator commands from stdin
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    spawn_stdin_reader(cmd_tx).context("Failed to start command reader")?;

    // Handle shutdown on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let sampler = Sampler::from_config(&config, session, source, metrics.clone());
    let log = sampler.run(cmd_rx, enrich_rx, shutdown_rx).await;

    metrics.report().log();

    if let Some(path) = config.export_csv() {
        match log.export_csv(path) {
            Ok(rows) => info!(path = %path, rows = %rows, "final_export_written"),
            Err(e) => error!(path = %path, error = %e, "final_export_failed"),
        }
    }

    info!(locks_logged = %log.len(), "coord_lock_shutdown_complete");
    Ok(())
}
