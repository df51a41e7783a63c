//! HTTP client for the fleet directory service.
//!
//! Commands and the runner talk to the directory through the [`Directory`]
//! trait so fetch/retry logic stays testable without a live endpoint; the
//! [`HttpDirectory`] implementation encapsulates all wire-level concerns.

use std::time::Duration;

use refrain_core::Family;
use serde_json::Value;

use crate::record::ServiceRecord;

/// Errors surfaced by directory calls. None of these are fatal to a run:
/// the fetcher degrades to partial results and the credential resolver
/// falls back to cached values.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The directory asked us to back off (HTTP 429).
    #[error("rate limited by the directory service")]
    RateLimited,

    /// Any other unexpected status.
    #[error("unexpected directory status {status}")]
    Status { status: u16 },

    /// The body did not parse as the expected payload.
    #[error("malformed directory response: {0}")]
    Malformed(String),

    /// Connection-level failure (refused, timeout, DNS).
    #[error("directory request failed: {0}")]
    Network(String),
}

/// The directory operations the reconciler needs.
pub trait Directory {
    /// One page of the paginated service listing.
    fn list_page(&self, page: u32, per_page: u32) -> Result<Vec<ServiceRecord>, DirectoryError>;

    /// A single service record, fetched fresh (used for credential refresh).
    fn fetch_service(&self, id: &str) -> Result<ServiceRecord, DirectoryError>;

    /// Restart a server via its family-specific endpoint, falling back to
    /// the generic restart field on the service itself.
    fn restart(&self, id: &str, family: Family) -> Result<(), DirectoryError>;
}

/// Directory client over HTTP with bearer-token authentication.
pub struct HttpDirectory {
    base_url: String,
    token: String,
    agent: ureq::Agent,
}

impl HttpDirectory {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Self {
        HttpDirectory {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            agent: agent_with_timeout(timeout),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl Directory for HttpDirectory {
    fn list_page(&self, page: u32, per_page: u32) -> Result<Vec<ServiceRecord>, DirectoryError> {
        let url = format!(
            "{}/services?page={}&per_page={}",
            self.base_url, page, per_page
        );

        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer())
            .call()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            429 => return Err(DirectoryError::RateLimited),
            status => return Err(DirectoryError::Status { status }),
        }

        let body: Value = response
            .into_body()
            .read_json()
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

        let data = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| DirectoryError::Malformed("missing 'data' array".to_string()))?;

        Ok(parse_services(data))
    }

    fn fetch_service(&self, id: &str) -> Result<ServiceRecord, DirectoryError> {
        let url = format!("{}/services/{}", self.base_url, id);

        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer())
            .call()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            429 => return Err(DirectoryError::RateLimited),
            status => return Err(DirectoryError::Status { status }),
        }

        let body: Value = response
            .into_body()
            .read_json()
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

        ServiceRecord::from_json(&body)
            .ok_or_else(|| DirectoryError::Malformed("not a managed service".to_string()))
    }

    fn restart(&self, id: &str, family: Family) -> Result<(), DirectoryError> {
        let url = format!("{}/services/{}/{}/restart", self.base_url, id, family);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer())
            .send_empty()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        if matches!(response.status().as_u16(), 200 | 202) {
            return Ok(());
        }

        tracing::warn!(
            service = id,
            status = response.status().as_u16(),
            "family restart endpoint refused, trying generic restart"
        );

        let url = format!("{}/services/{}", self.base_url, id);
        let response = self
            .agent
            .put(&url)
            .header("Authorization", &self.bearer())
            .send_json(&serde_json::json!({"restart_at": "now"}))
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 | 202 => Ok(()),
            status => Err(DirectoryError::Status { status }),
        }
    }
}

/// Parse the entries of one listing page, dropping services that belong to
/// neither backend family.
pub(crate) fn parse_services(entries: &[Value]) -> Vec<ServiceRecord> {
    entries.iter().filter_map(ServiceRecord::from_json).collect()
}

/// Build a ureq agent with a per-call-class timeout. Status codes are kept
/// out of the error path so callers can branch on 429 and friends directly.
pub(crate) fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
