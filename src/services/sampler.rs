//! Sampler - the periodic task that drives the pipeline
//!
//! Owns the tick timer and the reentrancy guard. At most one recognition
//! call is in flight; ticks that fire meanwhile are dropped, not queued.
//! All pipeline and log mutation happens on this loop, including manual
//! lock commands and late enrichment results, so nothing needs a lock.

use crate::domain::types::{Command, TickResult};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::recognizer::TextSource;
use crate::io::session_log::SessionLog;
use crate::services::enrich_worker::EnrichResult;
use crate::services::pipeline::{Pipeline, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Outcome of one spawned recognition call
struct Recognition {
    result: anyhow::Result<String>,
    latency_ms: u64,
}

/// Drives `Pipeline::tick` from a fixed-interval timer
pub struct Sampler {
    pipeline: Pipeline,
    session: Session,
    source: Arc<dyn TextSource>,
    interval: Duration,
    metrics_interval: Duration,
    /// Upper bound on waiting for in-flight addresses at exit
    drain_timeout: Duration,
    export_path: Option<PathBuf>,
    metrics: Arc<Metrics>,
}

impl Sampler {
    pub fn new(
        pipeline: Pipeline,
        session: Session,
        source: Arc<dyn TextSource>,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pipeline,
            session,
            source,
            interval,
            metrics_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(2),
            export_path: None,
            metrics,
        }
    }

    /// Build a sampler with intervals and export path taken from config
    pub fn from_config(
        config: &Config,
        session: Session,
        source: Arc<dyn TextSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut sampler =
            Self::new(Pipeline::from_config(config), session, source, config.interval(), metrics);
        sampler.metrics_interval = config.metrics_interval();
        sampler.drain_timeout = config.geocoder_timeout();
        sampler.export_path = config.export_csv().map(PathBuf::from);
        sampler
    }

    /// Run until shutdown, a quit command, or the source runs dry.
    /// Returns the session log for final export.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut enrich_rx: Option<mpsc::Receiver<EnrichResult>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionLog {
        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = interval_at(
            tokio::time::Instant::now() + self.metrics_interval,
            self.metrics_interval,
        );

        let (done_tx, mut done_rx) = mpsc::channel::<Recognition>(1);
        let mut busy = false;
        let mut commands_open = true;

        info!(interval_ms = %self.interval.as_millis(), "sampler_started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if busy {
                        self.metrics.record_tick_skipped_busy();
                        trace!("tick_skipped_busy");
                        continue;
                    }
                    if self.source.finished() {
                        info!("source_finished");
                        break;
                    }
                    let Some(region) = self.source.frame() else {
                        self.metrics.record_tick_no_frame();
                        trace!("tick_no_frame");
                        continue;
                    };

                    busy = true;
                    let source = self.source.clone();
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let started = Instant::now();
                        let result = source.recognize(region).await;
                        let latency_ms = started.elapsed().as_millis() as u64;
                        let _ = done_tx.send(Recognition { result, latency_ms }).await;
                    });
                }
                Some(recognition) = done_rx.recv() => {
                    busy = false;
                    self.on_recognition(recognition);
                }
                result = recv_enrichment(&mut enrich_rx) => {
                    match result {
                        Some(result) => self.on_enrichment(result),
                        None => enrich_rx = None,
                    }
                }
                cmd = cmd_rx.recv(), if commands_open => {
                    match cmd {
                        Some(Command::Quit) => {
                            info!("quit_requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => commands_open = false,
                    }
                }
                _ = report.tick() => {
                    self.metrics.report().log();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sampler_shutdown");
                        break;
                    }
                }
            }
        }

        self.session.close_enrichment();
        if let Some(rx) = enrich_rx.as_mut() {
            self.drain_enrichment(rx).await;
        }

        info!(
            locks_logged = %self.session.session_log().len(),
            score = %self.pipeline.score(),
            "sampler_stopped"
        );
        self.session.into_log()
    }

    fn on_recognition(&mut self, recognition: Recognition) {
        let result = match recognition.result {
            Ok(text) => {
                self.metrics.record_recognition(recognition.latency_ms);
                trace!(text = %text, latency_ms = %recognition.latency_ms, "recognition_done");
                self.pipeline.tick(&mut self.session, &text)
            }
            Err(e) => {
                self.metrics.record_recognition_failure();
                warn!(error = %format!("{:#}", e), "recognition_failed");
                self.pipeline.miss(&mut self.session)
            }
        };

        if let TickResult::Locked(event) = result {
            debug!(lat = %event.lat, lng = %event.lng, "auto_lock");
        }
    }

    fn on_enrichment(&mut self, result: EnrichResult) {
        if !self.session.attach_address(&result.entry, result.address) {
            debug!(entry = %result.entry, "enrich_entry_not_found");
        }
    }

    /// Attach addresses still in flight so the final export carries them.
    /// Ends when the worker closes its result channel or the timeout expires.
    async fn drain_enrichment(&mut self, rx: &mut mpsc::Receiver<EnrichResult>) {
        let deadline = tokio::time::sleep(self.drain_timeout);
        tokio::pin!(deadline);
        let mut drained = 0usize;

        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Some(result) => {
                        self.on_enrichment(result);
                        drained += 1;
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(drained = %drained, "enrich_drain_timeout");
                    return;
                }
            }
        }
        debug!(drained = %drained, "enrich_drained");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ManualLock => {
                if let Ok(event) = self.pipeline.on_manual_lock(&mut self.session) {
                    debug!(lat = %event.lat, lng = %event.lng, "manual_lock");
                }
            }
            Command::ToggleAxisSwap => {
                self.session.on_axis_swap_toggle();
            }
            Command::Reset => {
                self.pipeline.reset();
                info!("stabilizer_reset");
            }
            Command::Export(path) => {
                let Some(path) = path.or_else(|| self.export_path.clone()) else {
                    warn!("export_no_path");
                    return;
                };
                match self.session.session_log().export_csv(&path) {
                    Ok(rows) => info!(path = %path.display(), rows = %rows, "log_exported"),
                    Err(e) => error!(path = %path.display(), error = %e, "log_export_failed"),
                }
            }
            Command::Status => {
                info!(
                    phase = %self.pipeline.phase().as_str(),
                    score = %self.pipeline.score(),
                    last_key = ?self.pipeline.last_key(),
                    last_text = ?self.pipeline.last_seen_text().map(|t| t.as_str()),
                    axis_swap = %self.session.axis_swap(),
                    locks_logged = %self.session.session_log().len(),
                    "status"
                );
            }
            Command::Quit => {}
        }
    }
}

async fn recv_enrichment(rx: &mut Option<mpsc::Receiver<EnrichResult>>) -> Option<EnrichResult> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
