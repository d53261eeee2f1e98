//! Shared types for the coordinate lock pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Recognized text with every character outside `[0-9.,\- ]` removed
/// and whitespace collapsed to single spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// Wrap text that is already normalized
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed coordinate pair from one recognition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub lat: f64,
    pub lng: f64,
    /// Fixed-precision comparison key, e.g. `"-33.869,151.209"`
    pub raw_key: String,
}

/// Who committed a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockSource {
    Auto,
    Manual,
}

impl LockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockSource::Auto => "auto",
            LockSource::Manual => "manual",
        }
    }

    /// Label used in the CSV export
    pub fn label(&self) -> &'static str {
        match self {
            LockSource::Auto => "Auto",
            LockSource::Manual => "Manual",
        }
    }
}

/// A committed lock. Only ever built from a range-validated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct LockEvent {
    pub lat: f64,
    pub lng: f64,
    pub source: LockSource,
    pub timestamp: DateTime<Utc>,
}

impl LockEvent {
    pub(crate) fn from_candidate(candidate: &Candidate, source: LockSource) -> Self {
        Self { lat: candidate.lat, lng: candidate.lng, source, timestamp: Utc::now() }
    }
}

/// Newtype wrapper for session log entry IDs (UUIDv7, time-sortable)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reverse-geocoded place attached to a log entry after the fact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub road_name: Option<String>,
    pub locality_name: Option<String>,
}

impl Address {
    /// Human-readable form, `None` when both parts are missing
    pub fn label(&self) -> Option<String> {
        match (&self.road_name, &self.locality_name) {
            (Some(road), Some(locality)) => Some(format!("{}, {}", road, locality)),
            (Some(road), None) => Some(road.clone()),
            (None, Some(locality)) => Some(locality.clone()),
            (None, None) => None,
        }
    }
}

/// Session log record, append-only, in commit order
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: EntryId,
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub source: LockSource,
    pub address: Option<Address>,
}

/// Crop region handed to the recognizer, in frame pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Stabilization engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizerPhase {
    /// score == 0
    Searching,
    /// 0 < score < 100
    Accumulating,
    /// score == 100, consumed within the same tick
    Ready,
}

impl StabilizerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StabilizerPhase::Searching => "searching",
            StabilizerPhase::Accumulating => "accumulating",
            StabilizerPhase::Ready => "ready",
        }
    }
}

/// Outcome of one recognition cycle
#[derive(Debug, Clone, PartialEq)]
pub enum TickResult {
    /// No valid candidate this tick; score after decay
    Miss { score: u8 },
    /// Candidate accepted; score after growth
    Candidate { candidate: Candidate, score: u8 },
    /// Score reached 100 and a lock was dispatched
    Locked(LockEvent),
}

/// Operator commands, strictly separated from pipeline logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ManualLock,
    ToggleAxisSwap,
    Reset,
    Export(Option<PathBuf>),
    Status,
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_label() {
        let full = Address {
            road_name: Some("George St".to_string()),
            locality_name: Some("Sydney".to_string()),
        };
        assert_eq!(full.label().as_deref(), Some("George St, Sydney"));

        let road_only = Address { road_name: Some("George St".to_string()), locality_name: None };
        assert_eq!(road_only.label().as_deref(), Some("George St"));

        assert_eq!(Address::default().label(), None);
    }

    #[test]
    fn test_lock_source_strings() {
        assert_eq!(LockSource::Auto.as_str(), "auto");
        assert_eq!(LockSource::Manual.label(), "Manual");
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let a = EntryId::generate();
        let b = EntryId::generate();
        assert_ne!(a, b);
    }
}
