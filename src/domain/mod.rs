//! Domain models - core types of the coordinate lock pipeline
//!
//! This module contains the canonical data types used throughout the system:
//! - `NormalizedText` - recognized text reduced to coordinate characters
//! - `Candidate` - a parsed, not-yet-locked coordinate pair
//! - `LockEvent` - a committed lock, automatic or manual
//! - `LogEntry` - a session log record
//! - `Command` - operator commands fed to the sampler

pub mod types;

pub use types::{
    Address, Candidate, Command, CropRect, EntryId, LockEvent, LockSource, LogEntry,
    NormalizedText, StabilizerPhase, TickResult,
};
