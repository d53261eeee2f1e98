//! Display and haptic sinks
//!
//! Sinks are best-effort collaborators: a failure is reported to the
//! caller, which logs it and carries on. A device with no vibration motor
//! uses `NoHaptic`.

use crate::domain::types::LockEvent;
use std::time::Duration;
use tracing::{debug, info};

/// Map/display output for previews and committed locks
pub trait DisplaySink: Send + Sync {
    /// Recenter and mark the map on a committed lock
    fn show_lock(&self, event: &LockEvent, zoom_hint: u8, formatted: &str) -> anyhow::Result<()>;

    /// Show a provisional candidate with its stabilization score
    fn show_candidate(&self, formatted: &str, score: u8) -> anyhow::Result<()>;

    /// Nothing readable this tick; show the decayed score
    fn show_searching(&self, score: u8) -> anyhow::Result<()>;
}

/// Vibration feedback on lock
pub trait HapticSink: Send + Sync {
    fn vibrate(&self, duration: Duration) -> anyhow::Result<()>;
}

/// Format a coordinate pair for display, e.g. `"-33.86880, 151.20930"`
pub fn format_coordinate(lat: f64, lng: f64, precision: usize) -> String {
    format!("{:.*}, {:.*}", precision, lat, precision, lng)
}

/// Display sink that writes structured log events
#[derive(Debug, Default)]
pub struct TracingDisplay;

impl DisplaySink for TracingDisplay {
    fn show_lock(&self, event: &LockEvent, zoom_hint: u8, formatted: &str) -> anyhow::Result<()> {
        info!(
            coordinate = %formatted,
            source = %event.source.as_str(),
            zoom = %zoom_hint,
            "display_lock"
        );
        Ok(())
    }

    fn show_candidate(&self, formatted: &str, score: u8) -> anyhow::Result<()> {
        debug!(coordinate = %formatted, score = %score, "display_candidate");
        Ok(())
    }

    fn show_searching(&self, score: u8) -> anyhow::Result<()> {
        debug!(score = %score, "display_searching");
        Ok(())
    }
}

/// Haptic sink for devices without vibration support
#[derive(Debug, Default)]
pub struct NoHaptic;

impl HapticSink for NoHaptic {
    fn vibrate(&self, _duration: Duration) -> anyhow::Result<()> {
        Ok(())
    }
}
