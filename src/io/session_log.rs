//! Session log - append-only record of committed locks
//!
//! Entries are kept in commit order. Addresses arrive later from the
//! enrichment worker and are attached by entry ID. The log renders as CSV
//! with columns `Time,Lat,Lng,Source[,Address]`.

use crate::domain::types::{Address, EntryId, LockEvent, LogEntry};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only list of lock entries
#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append an entry for a lock and return its ID
    pub fn append(&mut self, event: &LockEvent) -> EntryId {
        let id = EntryId::generate();
        self.entries.push(LogEntry {
            id: id.clone(),
            time: event.timestamp,
            lat: event.lat,
            lng: event.lng,
            source: event.source,
            address: None,
        });
        debug!(entry = %id, count = %self.entries.len(), "session_log_appended");
        id
    }

    /// Most recently committed entry
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Attach an address to an existing entry. Returns false for unknown IDs.
    pub fn attach_address(&mut self, id: &EntryId, address: Address) -> bool {
        match self.entries.iter_mut().rev().find(|entry| &entry.id == id) {
            Some(entry) => {
                entry.address = Some(address);
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as CSV. The Address column appears only when some entry has one.
    pub fn to_csv(&self) -> String {
        let with_address = self.entries.iter().any(|entry| entry.address.is_some());

        let mut out = String::from("Time,Lat,Lng,Source");
        if with_address {
            out.push_str(",Address");
        }
        out.push('\n');

        for entry in &self.entries {
            out.push_str(&format!(
                "{},{},{},{}",
                entry.time.format(CSV_TIME_FORMAT),
                entry.lat,
                entry.lng,
                entry.source.label()
            ));
            if with_address {
                out.push(',');
                if let Some(label) = entry.address.as_ref().and_then(Address::label) {
                    out.push_str(&csv_field(&label));
                }
            }
            out.push('\n');
        }
        out
    }

    /// Write the CSV rendering to `path`, creating parent directories.
    /// Returns the number of rows written.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<usize> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, self.to_csv())?;
        info!(path = %path.display(), rows = %self.entries.len(), "session_log_exported");
        Ok(self.entries.len())
    }
}

/// Quote a CSV field if it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
