//! refrain-backend: the two backend-family adapters behind one contract.
//!
//! The families disagree about everything at the wire level -- JSON
//! documents behind a token header on one side, an XML preference listing
//! with form-encoded single-field writes behind a query-parameter token on
//! the other. [`MediaBackend`] is the seam that hides this from the
//! reconciliation engine: uniform read/write over [`ResourceDocument`]s,
//! with a capability flag for the one real behavioural split (document
//! writes vs independent per-field writes).
//!
//! Adapters are selected by the service record's family tag, never by
//! inheritance: two variant implementations of the same trait.

pub mod emby;
pub mod error;
pub mod plex;
pub mod resource;

use std::time::Duration;

use refrain_core::{ChangeRecord, Family, ResourceDocument};

pub use emby::EmbyApi;
pub use error::BackendError;
pub use plex::PlexApi;
pub use resource::{FieldWrite, Resource, Target, WriteOutcome, WriteReport};

/// Uniform contract over the two backend families.
pub trait MediaBackend {
    fn family(&self) -> Family;

    /// Cheap reachability/credential check. `false` means the caller
    /// should try a fresh credential before giving up on the server.
    fn probe(&self) -> bool;

    /// Enumerate the reconcilable resources on this server. Exempt-tier
    /// servers additionally expose the user-scoped targets.
    fn discover(&self, exempt_tier: bool) -> Result<Vec<Target>, BackendError>;

    /// Fetch one resource document, whole.
    fn read(&self, resource: &Resource) -> Result<ResourceDocument, BackendError>;

    /// Write a reconciled document back. Document-write families post the
    /// full document and ignore `changes`; field-write families write each
    /// changed field independently and report per-field outcomes.
    fn write(
        &self,
        resource: &Resource,
        document: &ResourceDocument,
        changes: &[ChangeRecord],
    ) -> Result<WriteReport, BackendError>;

    /// Whether writes land field-by-field rather than as one document.
    fn supports_field_writes(&self) -> bool;
}

/// Build the adapter for a family from connection details.
pub fn backend_for(family: Family, host: &str, port: u16, credential: &str) -> Box<dyn MediaBackend> {
    match family {
        Family::Emby => Box::new(EmbyApi::new(host, port, credential)),
        Family::Plex => Box::new(PlexApi::new(host, port, credential)),
    }
}

/// Build a ureq agent with a per-call-class timeout. Statuses stay out of
/// the error path so adapters can branch on them directly.
pub(crate) fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// Percent-encode a query/form value (spaces become `%20`).
pub(crate) fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(ch),
            ' ' => out.push_str("%20"),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_passes_safe_chars_through() {
        assert_eq!(urlencoded("Movies-4K_v2.x~"), "Movies-4K_v2.x~");
    }

    #[test]
    fn urlencoded_escapes_spaces_and_symbols() {
        assert_eq!(urlencoded("Kids Movies"), "Kids%20Movies");
        assert_eq!(urlencoded("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn backend_for_selects_by_family_tag() {
        let emby = backend_for(Family::Emby, "10.0.0.1", 8096, "tok");
        assert_eq!(emby.family(), Family::Emby);
        assert!(!emby.supports_field_writes());

        let plex = backend_for(Family::Plex, "10.0.0.1", 32400, "tok");
        assert_eq!(plex.family(), Family::Plex);
        assert!(plex.supports_field_writes());
    }
}
