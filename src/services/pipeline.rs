//! Per-tick orchestration: normalize -> parse -> validate -> stabilize -> dispatch
//!
//! `Pipeline` holds only the stabilization state and the last normalized
//! text. Everything else a tick touches (parser settings, axis swap,
//! dispatcher, metrics) lives in the `Session` passed into each call, so the
//! surrounding application owns the timer and the collaborators.

use crate::domain::types::{
    Address, Candidate, EntryId, LockEvent, LockSource, NormalizedText, StabilizerPhase,
    TickResult,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::session_log::SessionLog;
use crate::io::sinks::{format_coordinate, DisplaySink, HapticSink};
use crate::services::dispatcher::{DispatchSettings, Dispatcher};
use crate::services::enrich_worker::EnrichRequest;
use crate::services::normalizer::normalize;
use crate::services::parser::CandidateParser;
use crate::services::stabilizer::Stabilizer;
use crate::services::validator::validate;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Why a manual lock could not be committed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManualLockError {
    #[error("no text has been recognized yet")]
    NoText,
    #[error("no valid coordinate candidate in the last recognized text")]
    NoCandidate,
    #[error("coordinate out of range: lat {lat}, lng {lng}")]
    OutOfRange { lat: f64, lng: f64 },
}

/// Session context: collaborators and operator-controlled settings
pub struct Session {
    parser: CandidateParser,
    axis_swap: bool,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
}

impl Session {
    pub fn new(
        parser: CandidateParser,
        axis_swap: bool,
        dispatcher: Dispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { parser, axis_swap, dispatcher, metrics }
    }

    /// Build a session from configuration and the given sinks
    pub fn from_config(
        config: &Config,
        display: Arc<dyn DisplaySink>,
        haptic: Arc<dyn HapticSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let settings = DispatchSettings {
            haptic_duration: config.haptic_duration(),
            zoom_hint: config.zoom_hint(),
            display_precision: config.display_precision(),
            key_precision: config.parser_settings().key_precision,
        };
        let dispatcher = Dispatcher::new(settings, display, haptic, metrics.clone());
        let parser = CandidateParser::new(config.parser_settings().clone());
        Self::new(parser, config.axis_swap(), dispatcher, metrics)
    }

    /// Route logged locks to the enrichment worker
    pub fn with_enrichment(mut self, enrich_tx: mpsc::Sender<EnrichRequest>) -> Self {
        self.dispatcher = self.dispatcher.with_enrichment(enrich_tx);
        self
    }

    /// Drop the enrichment sender so the worker drains its queue and exits
    pub fn close_enrichment(&mut self) -> bool {
        self.dispatcher.close_enrichment()
    }

    /// Flip the lat/lng token order. Returns the new setting.
    pub fn on_axis_swap_toggle(&mut self) -> bool {
        self.axis_swap = !self.axis_swap;
        info!(axis_swap = %self.axis_swap, "axis_swap_toggled");
        self.axis_swap
    }

    pub fn axis_swap(&self) -> bool {
        self.axis_swap
    }

    pub fn session_log(&self) -> &SessionLog {
        self.dispatcher.log()
    }

    /// Attach a late-arriving address to a logged lock
    pub fn attach_address(&mut self, id: &EntryId, address: Address) -> bool {
        self.dispatcher.log_mut().attach_address(id, address)
    }

    pub fn into_log(self) -> SessionLog {
        self.dispatcher.into_log()
    }

    fn preview_candidate(&self, candidate: &Candidate, score: u8) {
        let precision = self.dispatcher.settings().display_precision;
        let formatted = format_coordinate(candidate.lat, candidate.lng, precision);
        if let Err(e) = self.dispatcher.display().show_candidate(&formatted, score) {
            warn!(error = %e, "display_candidate_failed");
        }
    }

    fn preview_searching(&self, score: u8) {
        if let Err(e) = self.dispatcher.display().show_searching(score) {
            warn!(error = %e, "display_searching_failed");
        }
    }
}

/// Stabilization state plus the text manual override re-reads
#[derive(Debug, Clone)]
pub struct Pipeline {
    stabilizer: Stabilizer,
    last_seen_text: Option<NormalizedText>,
}

impl Pipeline {
    pub fn new(grow_step: u8, decay_step: u8) -> Self {
        Self { stabilizer: Stabilizer::new(grow_step, decay_step), last_seen_text: None }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.grow_step(), config.decay_step())
    }

    /// Process one recognized string
    pub fn tick(&mut self, session: &mut Session, raw: &str) -> TickResult {
        let text = normalize(raw);
        let candidate = session.parser.parse(&text, session.axis_swap).and_then(validate);
        self.last_seen_text = Some(text);

        let Some(candidate) = candidate else {
            return self.miss(session);
        };

        session.metrics.record_candidate();
        match self.stabilizer.observe(Some(candidate.clone())) {
            Some(ready) => {
                let outcome = session.dispatcher.dispatch(&ready, LockSource::Auto);
                TickResult::Locked(outcome.event)
            }
            None => {
                let score = self.stabilizer.score();
                trace!(key = %candidate.raw_key, score = %score, "tick_candidate");
                session.preview_candidate(&candidate, score);
                TickResult::Candidate { candidate, score }
            }
        }
    }

    /// A tick with no usable candidate (unreadable text or failed recognition)
    pub fn miss(&mut self, session: &mut Session) -> TickResult {
        self.stabilizer.observe(None);
        let score = self.stabilizer.score();
        session.metrics.record_miss();
        trace!(score = %score, "tick_miss");
        session.preview_searching(score);
        TickResult::Miss { score }
    }

    /// Lock the last seen text immediately, bypassing stabilization
    ///
    /// Stabilization state is left untouched. On failure nothing is
    /// dispatched or logged.
    pub fn on_manual_lock(&mut self, session: &mut Session) -> Result<LockEvent, ManualLockError> {
        match self.manual_candidate(session) {
            Ok(candidate) => {
                let outcome = session.dispatcher.dispatch(&candidate, LockSource::Manual);
                Ok(outcome.event)
            }
            Err(e) => {
                session.metrics.record_manual_rejected();
                warn!(reason = %e, "manual_lock_rejected");
                Err(e)
            }
        }
    }

    fn manual_candidate(&self, session: &Session) -> Result<Candidate, ManualLockError> {
        let text = self.last_seen_text.as_ref().ok_or(ManualLockError::NoText)?;
        let candidate = session
            .parser
            .parse(text, session.axis_swap)
            .ok_or(ManualLockError::NoCandidate)?;
        let (lat, lng) = (candidate.lat, candidate.lng);
        validate(candidate).ok_or(ManualLockError::OutOfRange { lat, lng })
    }

    /// Drop accumulated agreement; the next lock needs a fresh run
    pub fn reset(&mut self) {
        debug!(score = %self.stabilizer.score(), "pipeline_reset");
        self.stabilizer.reset();
    }

    pub fn score(&self) -> u8 {
        self.stabilizer.score()
    }

    pub fn phase(&self) -> StabilizerPhase {
        self.stabilizer.phase()
    }

    pub fn last_key(&self) -> Option<&str> {
        self.stabilizer.last_key()
    }

    pub fn last_seen_text(&self) -> Option<&NormalizedText> {
        self.last_seen_text.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sinks::{NoHaptic, TracingDisplay};
    use crate::services::parser::ParserSettings;

    fn session() -> Session {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Dispatcher::new(
            DispatchSettings::default(),
            Arc::new(TracingDisplay),
            Arc::new(NoHaptic),
            metrics.clone(),
        );
        Session::new(CandidateParser::new(ParserSettings::default()), false, dispatcher, metrics)
    }

    #[test]
    fn test_four_identical_reads_lock_once() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        for expected in [25, 50, 75] {
            match pipeline.tick(&mut session, "-33.8688 151.2093") {
                TickResult::Candidate { score, .. } => assert_eq!(score, expected),
                other => panic!("expected candidate, got {:?}", other),
            }
        }

        match pipeline.tick(&mut session, "-33.8688 151.2093") {
            TickResult::Locked(event) => {
                assert_eq!(event.source, LockSource::Auto);
                assert_eq!(event.lat, -33.8688);
                assert_eq!(event.lng, 151.2093);
            }
            other => panic!("expected lock, got {:?}", other),
        }

        assert_eq!(pipeline.phase(), StabilizerPhase::Searching);
        assert_eq!(pipeline.last_key(), None);
        assert_eq!(session.session_log().len(), 1);
    }

    #[test]
    fn test_noise_is_stripped_before_parsing() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        let result = pipeline.tick(&mut session, "Lat: -33.8688  Lon: 151.2093");
        assert!(matches!(result, TickResult::Candidate { score: 25, .. }));
        assert_eq!(pipeline.last_seen_text().map(|t| t.as_str()), Some("-33.8688 151.2093"));
    }

    #[test]
    fn test_out_of_range_read_is_a_miss() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 10);

        pipeline.tick(&mut session, "10.0000 20.0000");
        assert_eq!(pipeline.tick(&mut session, "95.0000 20.0000"), TickResult::Miss { score: 15 });
        assert_eq!(pipeline.last_key(), Some("10.000,20.000"));
    }

    #[test]
    fn test_manual_lock_bypasses_stabilizer() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        pipeline.tick(&mut session, "-33.8688 151.2093");
        let event = pipeline.on_manual_lock(&mut session).unwrap();

        assert_eq!(event.source, LockSource::Manual);
        assert_eq!(pipeline.score(), 25);
        assert_eq!(session.session_log().len(), 1);
    }

    #[test]
    fn test_manual_lock_without_numbers_fails() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        assert_eq!(pipeline.on_manual_lock(&mut session), Err(ManualLockError::NoText));

        // Recognized, but nothing survives normalization
        pipeline.tick(&mut session, "no numbers here");
        assert_eq!(pipeline.on_manual_lock(&mut session), Err(ManualLockError::NoCandidate));

        pipeline.tick(&mut session, "12 7");
        assert_eq!(pipeline.on_manual_lock(&mut session), Err(ManualLockError::NoCandidate));

        assert!(session.session_log().is_empty());
    }

    #[test]
    fn test_manual_lock_out_of_range_reports_values() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        pipeline.tick(&mut session, "95.0000 20.0000");
        assert_eq!(
            pipeline.on_manual_lock(&mut session),
            Err(ManualLockError::OutOfRange { lat: 95.0, lng: 20.0 })
        );
        assert!(session.session_log().is_empty());
    }

    #[test]
    fn test_axis_swap_changes_key() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        pipeline.tick(&mut session, "151.2093 -33.8688");
        assert!(session.on_axis_swap_toggle());

        match pipeline.tick(&mut session, "151.2093 -33.8688") {
            TickResult::Candidate { candidate, score } => {
                assert_eq!(candidate.lat, -33.8688);
                assert_eq!(score, 25);
            }
            other => panic!("expected candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_requires_fresh_run() {
        let mut session = session();
        let mut pipeline = Pipeline::new(25, 5);

        pipeline.tick(&mut session, "1.0000 2.0000");
        pipeline.tick(&mut session, "1.0000 2.0000");
        pipeline.reset();

        assert_eq!(pipeline.score(), 0);
        assert!(matches!(
            pipeline.tick(&mut session, "1.0000 2.0000"),
            TickResult::Candidate { score: 25, .. }
        ));
    }
}
