//! Counters and a recognition latency histogram, reported periodically
//!
//! Every update is a single Relaxed atomic op on the sampler's hot path.
//! `report()` swaps the periodic counters and histogram back to zero;
//! the `*_total` counters only grow.
//!
//! These values are for reporting only. Nothing in the pipeline branches on them.

use crate::domain::types::LockSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Upper edges of the latency histogram in milliseconds. Each bucket doubles
/// the previous one; the last entry is the reported edge of the overflow bucket.
const LATENCY_EDGES_MS: [u64; NUM_BUCKETS] =
    [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];
const NUM_BUCKETS: usize = 11;

/// Histogram slot for a latency; anything past 5120 ms lands in the overflow slot
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    LATENCY_EDGES_MS[..NUM_BUCKETS - 1].partition_point(|&edge| edge < latency_ms)
}

/// Edge of the first bucket at which `fraction` of the samples are covered, 0 if empty
fn percentile_from_buckets(counts: &[u64; NUM_BUCKETS], fraction: f64) -> u64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0;
    }

    let needed = (total as f64 * fraction).ceil() as u64;
    let mut seen = 0u64;
    counts
        .iter()
        .zip(LATENCY_EDGES_MS)
        .find_map(|(&count, edge)| {
            seen += count;
            (seen >= needed).then_some(edge)
        })
        .unwrap_or(LATENCY_EDGES_MS[NUM_BUCKETS - 1])
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Recognition cycles completed (monotonic)
    ticks_total: AtomicU64,
    /// Recognition cycles since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Ticks dropped because a recognition call was in flight (monotonic)
    ticks_skipped_busy: AtomicU64,
    /// Ticks dropped because no frame was available (monotonic)
    ticks_no_frame: AtomicU64,
    /// Recognition calls that reported an error (monotonic)
    recognition_failures: AtomicU64,
    /// Recognition latency histogram (reset on report)
    recognition_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of recognition latencies in ms (reset on report)
    recognition_sum_ms: AtomicU64,
    /// Max recognition latency in ms (reset on report)
    recognition_max_ms: AtomicU64,
    /// Ticks without a valid candidate (monotonic)
    misses: AtomicU64,
    /// Ticks with a valid candidate (monotonic)
    candidates: AtomicU64,
    /// Automatic locks dispatched (monotonic)
    locks_auto: AtomicU64,
    /// Manual locks dispatched (monotonic)
    locks_manual: AtomicU64,
    /// Manual lock requests rejected (monotonic)
    manual_rejected: AtomicU64,
    /// Locks appended to the session log (monotonic)
    log_appended: AtomicU64,
    /// Locks not logged because they repeat the previous entry (monotonic)
    log_deduplicated: AtomicU64,
    /// Enrichment lookups that produced an address (monotonic)
    enrich_ok: AtomicU64,
    /// Enrichment lookups that found no place (monotonic)
    enrich_not_found: AtomicU64,
    /// Enrichment lookups that failed (monotonic)
    enrich_failed: AtomicU64,
    /// Enrichment requests dropped due to a full queue (monotonic)
    enrich_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            ticks_skipped_busy: AtomicU64::new(0),
            ticks_no_frame: AtomicU64::new(0),
            recognition_failures: AtomicU64::new(0),
            recognition_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            recognition_sum_ms: AtomicU64::new(0),
            recognition_max_ms: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            locks_auto: AtomicU64::new(0),
            locks_manual: AtomicU64::new(0),
            manual_rejected: AtomicU64::new(0),
            log_appended: AtomicU64::new(0),
            log_deduplicated: AtomicU64::new(0),
            enrich_ok: AtomicU64::new(0),
            enrich_not_found: AtomicU64::new(0),
            enrich_failed: AtomicU64::new(0),
            enrich_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed recognition call and its latency
    #[inline]
    pub fn record_recognition(&self, latency_ms: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.recognition_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.recognition_max_ms.fetch_max(latency_ms, Ordering::Relaxed);
        self.recognition_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_recognition_failure(&self) {
        self.recognition_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tick_skipped_busy(&self) {
        self.ticks_skipped_busy.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tick_no_frame(&self) {
        self.ticks_no_frame.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lock(&self, source: LockSource) {
        match source {
            LockSource::Auto => self.locks_auto.fetch_add(1, Ordering::Relaxed),
            LockSource::Manual => self.locks_manual.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_manual_rejected(&self) {
        self.manual_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_appended(&self) {
        self.log_appended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_deduplicated(&self) {
        self.log_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrich_ok(&self) {
        self.enrich_ok.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrich_not_found(&self) {
        self.enrich_not_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrich_failed(&self) {
        self.enrich_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrich_dropped(&self) {
        self.enrich_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn ticks_skipped_busy(&self) -> u64 {
        self.ticks_skipped_busy.load(Ordering::Relaxed)
    }

    pub fn locks_total(&self) -> u64 {
        self.locks_auto.load(Ordering::Relaxed) + self.locks_manual.load(Ordering::Relaxed)
    }

    pub fn log_deduplicated(&self) -> u64 {
        self.log_deduplicated.load(Ordering::Relaxed)
    }

    pub fn enrich_dropped(&self) -> u64 {
        self.enrich_dropped.load(Ordering::Relaxed)
    }

    /// Build a summary, resetting the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let recognition_sum = self.recognition_sum_ms.swap(0, Ordering::Relaxed);
        let recognition_max = self.recognition_max_ms.swap(0, Ordering::Relaxed);
        let buckets: [u64; NUM_BUCKETS] =
            std::array::from_fn(|i| self.recognition_buckets[i].swap(0, Ordering::Relaxed));

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            ticks_skipped_busy: self.ticks_skipped_busy.load(Ordering::Relaxed),
            ticks_no_frame: self.ticks_no_frame.load(Ordering::Relaxed),
            recognition_failures: self.recognition_failures.load(Ordering::Relaxed),
            recognition_avg_ms: if ticks_count > 0 { recognition_sum / ticks_count } else { 0 },
            recognition_max_ms: recognition_max,
            recognition_p95_ms: percentile_from_buckets(&buckets, 0.95),
            misses: self.misses.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            locks_auto: self.locks_auto.load(Ordering::Relaxed),
            locks_manual: self.locks_manual.load(Ordering::Relaxed),
            manual_rejected: self.manual_rejected.load(Ordering::Relaxed),
            log_appended: self.log_appended.load(Ordering::Relaxed),
            log_deduplicated: self.log_deduplicated.load(Ordering::Relaxed),
            enrich_ok: self.enrich_ok.load(Ordering::Relaxed),
            enrich_not_found: self.enrich_not_found.load(Ordering::Relaxed),
            enrich_failed: self.enrich_failed.load(Ordering::Relaxed),
            enrich_dropped: self.enrich_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub ticks_skipped_busy: u64,
    pub ticks_no_frame: u64,
    pub recognition_failures: u64,
    pub recognition_avg_ms: u64,
    pub recognition_max_ms: u64,
    pub recognition_p95_ms: u64,
    pub misses: u64,
    pub candidates: u64,
    pub locks_auto: u64,
    pub locks_manual: u64,
    pub manual_rejected: u64,
    pub log_appended: u64,
    pub log_deduplicated: u64,
    pub enrich_ok: u64,
    pub enrich_not_found: u64,
    pub enrich_failed: u64,
    pub enrich_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            skipped_busy = %self.ticks_skipped_busy,
            no_frame = %self.ticks_no_frame,
            recognition_failures = %self.recognition_failures,
            recognition_avg_ms = %self.recognition_avg_ms,
            recognition_p95_ms = %self.recognition_p95_ms,
            misses = %self.misses,
            candidates = %self.candidates,
            locks_auto = %self.locks_auto,
            locks_manual = %self.locks_manual,
            manual_rejected = %self.manual_rejected,
            log_appended = %self.log_appended,
            log_deduplicated = %self.log_deduplicated,
            enrich_ok = %self.enrich_ok,
            enrich_not_found = %self.enrich_not_found,
            enrich_failed = %self.enrich_failed,
            enrich_dropped = %self.enrich_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ticks_total(), 0);
        assert_eq!(metrics.locks_total(), 0);
    }

    #[test]
    fn test_record_recognition() {
        let metrics = Metrics::new();

        metrics.record_recognition(15);
        metrics.record_recognition(45);
        assert_eq!(metrics.ticks_total(), 2);
        assert_eq!(metrics.recognition_sum_ms.load(Ordering::Relaxed), 60);
        assert_eq!(metrics.recognition_max_ms.load(Ordering::Relaxed), 45);
    }

    #[test]
    fn test_record_locks_by_source() {
        let metrics = Metrics::new();
        metrics.record_lock(LockSource::Auto);
        metrics.record_lock(LockSource::Manual);
        metrics.record_lock(LockSource::Auto);

        let summary = metrics.report();
        assert_eq!(summary.locks_auto, 2);
        assert_eq!(summary.locks_manual, 1);
        assert_eq!(metrics.locks_total(), 3);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_recognition(100);
        metrics.record_recognition(300);
        metrics.record_miss();

        let summary = metrics.report();
        assert_eq!(summary.ticks_total, 2);
        assert_eq!(summary.recognition_avg_ms, 200);
        assert_eq!(summary.recognition_max_ms, 300);
        assert_eq!(summary.misses, 1);

        let summary = metrics.report();
        assert_eq!(summary.ticks_total, 2);
        assert_eq!(summary.recognition_avg_ms, 0);
        assert_eq!(summary.recognition_max_ms, 0);
        assert_eq!(summary.misses, 1);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(10), 0);
        assert_eq!(bucket_index(11), 1);
        assert_eq!(bucket_index(5120), 9);
        assert_eq!(bucket_index(9999), 10);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&buckets, 0.95), 0);

        buckets[2] = 90;
        buckets[6] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 40);
        assert_eq!(percentile_from_buckets(&buckets, 0.95), 640);
    }
}
