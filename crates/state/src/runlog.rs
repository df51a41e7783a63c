//! Append-only log of reconciled servers.
//!
//! One tab-separated line per reconciliation attempt:
//! `timestamp \t service-id \t display-name`. Entries are appended, never
//! mutated; "processed" is decided by the presence of the most recent
//! matching entry, scanning backward. Rotation (if any) is external.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::StateError;

pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RunLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a reconciliation attempt was ever recorded for the service.
    ///
    /// A missing or unreadable log means nothing is known to be processed;
    /// the caller then errs toward reprocessing.
    pub fn is_processed(&self, service_id: &str) -> bool {
        self.last_processed(service_id).is_some()
    }

    /// Timestamp of the most recent recorded attempt for the service.
    pub fn last_processed(&self, service_id: &str) -> Option<OffsetDateTime> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        for line in contents.lines().rev() {
            let mut parts = line.splitn(3, '\t');
            let timestamp = parts.next()?;
            if parts.next() == Some(service_id) {
                return OffsetDateTime::parse(timestamp, &Rfc3339).ok();
            }
        }
        None
    }

    /// Append an entry for the service, stamped now. Recorded once per
    /// server per run, whether or not any change was applied.
    pub fn record(&self, service_id: &str, display_name: &str) -> Result<(), StateError> {
        self.record_at(service_id, display_name, OffsetDateTime::now_utc())
    }

    fn record_at(
        &self,
        service_id: &str,
        display_name: &str,
        timestamp: OffsetDateTime,
    ) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let stamp = timestamp.format(&Rfc3339).unwrap_or_else(|_| {
            warn!("run-log timestamp failed to format, writing placeholder");
            "unknown".to_string()
        });

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{stamp}\t{service_id}\t{display_name}")?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
