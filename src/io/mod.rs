//! IO modules - external collaborator interfaces
//!
//! This module contains all external IO operations:
//! - `recognizer` - Frame source and text recognition (`TextSource`)
//! - `sinks` - Display/map and haptic outputs
//! - `geocoder` - Reverse geocoding for log enrichment
//! - `session_log` - Append-only lock log with CSV export
//! - `commands` - Operator command input from stdin

pub mod commands;
pub mod geocoder;
pub mod recognizer;
pub mod session_log;
pub mod sinks;

// Re-export commonly used types
pub use geocoder::{NominatimGeocoder, ReverseGeocoder};
pub use recognizer::{RecognitionConfig, ReplaySource, TextSource};
pub use session_log::SessionLog;
pub use sinks::{DisplaySink, HapticSink, NoHaptic, TracingDisplay};
