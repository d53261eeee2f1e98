//! Address enrichment worker - reverse geocoding off the lock path
//!
//! The dispatcher enqueues a request for each logged lock via a bounded
//! mpsc channel. The worker resolves it and sends the address back to the
//! sampler loop, which attaches it to the already-appended log entry.

use crate::domain::types::{Address, EntryId};
use crate::infra::metrics::Metrics;
use crate::io::geocoder::ReverseGeocoder;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A log entry waiting for an address
#[derive(Debug)]
pub struct EnrichRequest {
    pub entry: EntryId,
    pub lat: f64,
    pub lng: f64,
    /// When the request was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// A resolved address for a log entry
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichResult {
    pub entry: EntryId,
    pub address: Address,
}

/// Worker that resolves enrichment requests one at a time
pub struct EnrichWorker {
    geocoder: Arc<dyn ReverseGeocoder>,
    req_rx: mpsc::Receiver<EnrichRequest>,
    result_tx: mpsc::Sender<EnrichResult>,
    metrics: Arc<Metrics>,
}

impl EnrichWorker {
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        req_rx: mpsc::Receiver<EnrichRequest>,
        result_tx: mpsc::Sender<EnrichResult>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { geocoder, req_rx, result_tx, metrics }
    }

    /// Run the worker, processing requests until the channel closes
    pub async fn run(mut self) {
        info!("enrich_worker_started");

        while let Some(req) = self.req_rx.recv().await {
            let queue_delay_ms = req.enqueued_at.elapsed().as_millis() as u64;
            let lookup_start = Instant::now();

            match self.geocoder.reverse(req.lat, req.lng).await {
                Ok(Some(address)) => {
                    info!(
                        entry = %req.entry,
                        address = ?address.label(),
                        queue_delay_ms = %queue_delay_ms,
                        lookup_ms = %lookup_start.elapsed().as_millis(),
                        "enrich_resolved"
                    );
                    self.metrics.record_enrich_ok();
                    if self.result_tx.send(EnrichResult { entry: req.entry, address }).await.is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(entry = %req.entry, lat = %req.lat, lng = %req.lng, "enrich_not_found");
                    self.metrics.record_enrich_not_found();
                }
                Err(e) => {
                    warn!(entry = %req.entry, error = %format!("{:#}", e), "enrich_failed");
                    self.metrics.record_enrich_failed();
                }
            }
        }

        info!("enrich_worker_stopped");
    }
}

/// Create the enrichment channels and worker
///
/// Returns the request sender (for the dispatcher), the result receiver
/// (for the sampler) and the worker (to be spawned)
pub fn create_enrich_worker(
    geocoder: Arc<dyn ReverseGeocoder>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<EnrichRequest>, mpsc::Receiver<EnrichResult>, EnrichWorker) {
    let (req_tx, req_rx) = mpsc::channel(buffer_size);
    let (result_tx, result_rx) = mpsc::channel(buffer_size);
    let worker = EnrichWorker::new(geocoder, req_rx, result_tx, metrics);
    (req_tx, result_rx, worker)
}
