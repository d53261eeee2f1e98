//! Services - coordinate extraction and lock decisions
//!
//! Leaves first:
//! - `normalizer` - strips recognizer output to coordinate characters
//! - `parser` - extracts a lat/lng candidate with digit correction
//! - `validator` - latitude/longitude bounds
//! - `stabilizer` - consecutive-agreement scoring
//! - `dispatcher` - lock fan-out to display, haptic, log and enrichment
//! - `pipeline` - per-tick orchestration and manual override
//! - `enrich_worker` - async reverse geocoding worker
//! - `sampler` - periodic task with the reentrancy guard

pub mod dispatcher;
pub mod enrich_worker;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod sampler;
pub mod stabilizer;
pub mod validator;

// Re-export commonly used types
pub use dispatcher::{DispatchOutcome, DispatchSettings, Dispatcher};
pub use enrich_worker::{create_enrich_worker, EnrichRequest, EnrichResult, EnrichWorker};
pub use parser::{CandidateParser, DecimalCorrection, ParserSettings, Tokenizer};
pub use pipeline::{ManualLockError, Pipeline, Session};
pub use sampler::Sampler;
pub use stabilizer::Stabilizer;
