//! Append-only cache of known-working connection details.
//!
//! One tab-separated line per entry:
//! `timestamp \t service-id \t host \t port \t token`. Lookup scans
//! backward so the most recently cached connection wins. The file is the
//! substitutable persistence format; nothing in the reconciliation core
//! depends on its layout.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StateError;

/// A cached connection that worked on a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedConnection {
    pub host: String,
    pub port: u16,
    pub token: String,
}

pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recently cached connection for a service, if any. Corrupt
    /// lines (e.g. truncated by a crashed run) are skipped, not fatal.
    pub fn lookup(&self, service_id: &str) -> Option<CachedConnection> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        contents
            .lines()
            .rev()
            .find_map(|line| parse_entry(line, service_id))
    }

    /// Append a connection that just worked.
    pub fn store(
        &self,
        service_id: &str,
        connection: &CachedConnection,
    ) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "{stamp}\t{service_id}\t{}\t{}\t{}",
            connection.host, connection.port, connection.token
        )?;
        Ok(())
    }
}

fn parse_entry(line: &str, service_id: &str) -> Option<CachedConnection> {
    let mut parts = line.split('\t');
    let _timestamp = parts.next()?;
    if parts.next() != Some(service_id) {
        return None;
    }
    let host = parts.next()?.to_string();
    let port = parts.next()?.parse().ok()?;
    let token = parts.next()?.to_string();
    Some(CachedConnection { host, port, token })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir) -> TokenCache {
        TokenCache::new(dir.path().join("state/tokens.log"))
    }

    fn conn(host: &str, token: &str) -> CachedConnection {
        CachedConnection {
            host: host.to_string(),
            port: 32400,
            token: token.to_string(),
        }
    }

    #[test]
    fn empty_cache_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cache_in(&dir).lookup("9"), None);
    }

    #[test]
    fn store_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        cache.store("9", &conn("10.0.9.1", "tok-a")).unwrap();
        assert_eq!(cache.lookup("9"), Some(conn("10.0.9.1", "tok-a")));
        assert_eq!(cache.lookup("10"), None);
    }

    #[test]
    fn latest_entry_shadows_older_ones() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        cache.store("9", &conn("10.0.9.1", "tok-a")).unwrap();
        cache.store("9", &conn("10.0.9.2", "tok-b")).unwrap();

        assert_eq!(cache.lookup("9"), Some(conn("10.0.9.2", "tok-b")));
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.store("9", &conn("10.0.9.1", "tok-a")).unwrap();

        // a truncated line appended by a crashed run
        let mut file = OpenOptions::new().append(true).open(cache.path()).unwrap();
        writeln!(file, "2026-07-01T00:00:00Z\t9\tonly-host").unwrap();

        assert_eq!(cache.lookup("9"), Some(conn("10.0.9.1", "tok-a")));
    }
}
