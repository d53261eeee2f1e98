//! Lock dispatcher - fans a committed lock out to the sinks
//!
//! On every lock: haptic feedback, map/display update, session log append
//! and an enrichment request. Each side effect is best-effort and
//! independent; a failing sink is logged and the rest still run.
//!
//! A lock whose coordinate key matches the immediately preceding log entry
//! still updates the display but is not appended again.

use crate::domain::types::{Candidate, EntryId, LockEvent, LockSource};
use crate::infra::metrics::Metrics;
use crate::io::session_log::SessionLog;
use crate::io::sinks::{format_coordinate, DisplaySink, HapticSink};
use crate::services::enrich_worker::EnrichRequest;
use crate::services::parser::coordinate_key;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Presentation knobs for dispatched locks
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub haptic_duration: Duration,
    pub zoom_hint: u8,
    pub display_precision: usize,
    /// Precision used for the consecutive-duplicate check
    pub key_precision: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            haptic_duration: Duration::from_millis(200),
            zoom_hint: 16,
            display_precision: 5,
            key_precision: 3,
        }
    }
}

/// Result of a dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub event: LockEvent,
    /// Log entry created for this lock, `None` if it repeated the previous one
    pub entry: Option<EntryId>,
}

/// Packages locks and notifies the external sinks
pub struct Dispatcher {
    settings: DispatchSettings,
    display: Arc<dyn DisplaySink>,
    haptic: Arc<dyn HapticSink>,
    log: SessionLog,
    enrich_tx: Option<mpsc::Sender<EnrichRequest>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        display: Arc<dyn DisplaySink>,
        haptic: Arc<dyn HapticSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { settings, display, haptic, log: SessionLog::new(), enrich_tx: None, metrics }
    }

    /// Enable address enrichment for logged locks
    pub fn with_enrichment(mut self, enrich_tx: mpsc::Sender<EnrichRequest>) -> Self {
        self.enrich_tx = Some(enrich_tx);
        self
    }

    /// Stop sending enrichment requests. Returns true if a channel was open.
    pub fn close_enrichment(&mut self) -> bool {
        self.enrich_tx.take().is_some()
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn display(&self) -> &Arc<dyn DisplaySink> {
        &self.display
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut SessionLog {
        &mut self.log
    }

    pub fn into_log(self) -> SessionLog {
        self.log
    }

    /// Dispatch a range-validated candidate
    pub fn dispatch(&mut self, candidate: &Candidate, source: LockSource) -> DispatchOutcome {
        let event = LockEvent::from_candidate(candidate, source);
        let formatted = format_coordinate(event.lat, event.lng, self.settings.display_precision);
        self.metrics.record_lock(source);

        if let Err(e) = self.haptic.vibrate(self.settings.haptic_duration) {
            warn!(error = %e, "haptic_failed");
        }

        if let Err(e) = self.display.show_lock(&event, self.settings.zoom_hint, &formatted) {
            warn!(error = %e, "display_lock_failed");
        }

        let entry = if self.repeats_last_entry(&event) {
            debug!(coordinate = %formatted, "lock_not_logged_duplicate");
            self.metrics.record_log_deduplicated();
            None
        } else {
            let id = self.log.append(&event);
            self.metrics.record_log_appended();
            self.request_enrichment(&id, &event);
            Some(id)
        };

        info!(
            coordinate = %formatted,
            source = %source.as_str(),
            logged = %entry.is_some(),
            "lock_dispatched"
        );

        DispatchOutcome { event, entry }
    }

    fn repeats_last_entry(&self, event: &LockEvent) -> bool {
        let precision = self.settings.key_precision;
        self.log.last().is_some_and(|last| {
            coordinate_key(last.lat, last.lng, precision)
                == coordinate_key(event.lat, event.lng, precision)
        })
    }

    fn request_enrichment(&self, id: &EntryId, event: &LockEvent) {
        let Some(ref tx) = self.enrich_tx else {
            return;
        };
        let request = EnrichRequest {
            entry: id.clone(),
            lat: event.lat,
            lng: event.lng,
            enqueued_at: Instant::now(),
        };
        if let Err(e) = tx.try_send(request) {
            warn!(entry = %id, error = %e, "enrich_request_dropped");
            self.metrics.record_enrich_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDisplay {
        locks: Mutex<Vec<String>>,
    }

    impl DisplaySink for RecordingDisplay {
        fn show_lock(&self, _event: &LockEvent, _zoom: u8, formatted: &str) -> anyhow::Result<()> {
            self.locks.lock().push(formatted.to_string());
            Ok(())
        }

        fn show_candidate(&self, _formatted: &str, _score: u8) -> anyhow::Result<()> {
            Ok(())
        }

        fn show_searching(&self, _score: u8) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct BrokenHaptic;

    impl HapticSink for BrokenHaptic {
        fn vibrate(&self, _duration: Duration) -> anyhow::Result<()> {
            Err(anyhow!("vibration motor unavailable"))
        }
    }

    fn candidate(lat: f64, lng: f64) -> Candidate {
        Candidate { lat, lng, raw_key: coordinate_key(lat, lng, 3) }
    }

    fn dispatcher(display: Arc<RecordingDisplay>) -> Dispatcher {
        Dispatcher::new(
            DispatchSettings::default(),
            display,
            Arc::new(BrokenHaptic),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn test_consecutive_duplicate_not_logged_but_displayed() {
        let display = Arc::new(RecordingDisplay::default());
        let mut dispatcher = dispatcher(display.clone());

        let first = dispatcher.dispatch(&candidate(-33.8688, 151.2093), LockSource::Auto);
        let second = dispatcher.dispatch(&candidate(-33.8688, 151.2093), LockSource::Manual);

        assert!(first.entry.is_some());
        assert!(second.entry.is_none());
        assert_eq!(second.event.source, LockSource::Manual);
        assert_eq!(dispatcher.log().len(), 1);
        assert_eq!(display.locks.lock().len(), 2);
    }

    #[test]
    fn test_duplicate_check_uses_key_precision() {
        let mut dispatcher = dispatcher(Arc::new(RecordingDisplay::default()));

        dispatcher.dispatch(&candidate(-33.86880, 151.20930), LockSource::Auto);
        dispatcher.dispatch(&candidate(-33.86881, 151.20929), LockSource::Auto);
        assert_eq!(dispatcher.log().len(), 1);

        dispatcher.dispatch(&candidate(-33.8700, 151.2093), LockSource::Auto);
        assert_eq!(dispatcher.log().len(), 2);
    }

    #[test]
    fn test_non_consecutive_repeat_is_logged() {
        let mut dispatcher = dispatcher(Arc::new(RecordingDisplay::default()));

        dispatcher.dispatch(&candidate(10.0, 20.0), LockSource::Auto);
        dispatcher.dispatch(&candidate(11.0, 21.0), LockSource::Auto);
        dispatcher.dispatch(&candidate(10.0, 20.0), LockSource::Auto);

        assert_eq!(dispatcher.log().len(), 3);
    }

    #[test]
    fn test_haptic_failure_does_not_block_lock() {
        let display = Arc::new(RecordingDisplay::default());
        let mut dispatcher = dispatcher(display.clone());

        let outcome = dispatcher.dispatch(&candidate(1.0, 2.0), LockSource::Auto);
        assert!(outcome.entry.is_some());
        assert_eq!(display.locks.lock().as_slice(), ["1.00000, 2.00000"]);
    }

    #[tokio::test]
    async fn test_enrichment_requested_only_for_logged_entries() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut dispatcher = dispatcher(Arc::new(RecordingDisplay::default())).with_enrichment(tx);

        let outcome = dispatcher.dispatch(&candidate(1.0, 2.0), LockSource::Auto);
        dispatcher.dispatch(&candidate(1.0, 2.0), LockSource::Auto);

        let request = rx.recv().await.unwrap();
        assert_eq!(Some(request.entry), outcome.entry);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_enrichment_queue_drops_request() {
        let metrics = Arc::new(Metrics::new());
        let (tx, _rx) = mpsc::channel(1);
        let mut dispatcher = Dispatcher::new(
            DispatchSettings::default(),
            Arc::new(RecordingDisplay::default()),
            Arc::new(BrokenHaptic),
            metrics.clone(),
        )
        .with_enrichment(tx);

        dispatcher.dispatch(&candidate(1.0, 2.0), LockSource::Auto);
        dispatcher.dispatch(&candidate(3.0, 4.0), LockSource::Auto);

        assert_eq!(dispatcher.log().len(), 2);
        assert_eq!(metrics.enrich_dropped(), 1);
    }
}
