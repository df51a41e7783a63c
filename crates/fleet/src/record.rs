//! Service records: one managed server instance as listed by the fleet
//! directory.
//!
//! Records are immutable snapshots taken at fetch time. The directory is
//! the system of record for connection details and stored credentials;
//! nothing downstream mutates a record.

use refrain_core::Family;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One managed server instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub id: String,
    pub display_name: String,
    pub owner: String,
    pub family: Family,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// The credential the directory last knew to work for this server.
    pub credential: Option<String>,
    /// Product/tier classifier, e.g. `"Baremetal 8TB"`.
    pub classifier: String,
    /// RFC 3339 creation timestamp, as returned by the directory.
    pub created_at: Option<String>,
}

impl ServiceRecord {
    /// Parse a directory payload entry. Returns `None` for services that
    /// belong to neither backend family; those are not ours to manage.
    pub fn from_json(value: &Value) -> Option<Self> {
        let family = if value.get("is_emby").and_then(Value::as_bool) == Some(true) {
            Family::Emby
        } else if value.get("is_plex").and_then(Value::as_bool) == Some(true) {
            Family::Plex
        } else {
            return None;
        };

        let credential_key = match family {
            Family::Emby => "media_player_api_key",
            Family::Plex => "plex_token",
        };

        Some(ServiceRecord {
            id: scalar_string(value.get("id")?)?,
            display_name: value
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            owner: value
                .get("user")
                .and_then(|u| u.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            family,
            host: value
                .get("container_ip")
                .and_then(Value::as_str)
                .map(str::to_string),
            port: value.get("container_port").and_then(scalar_port),
            credential: value
                .get(credential_key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            classifier: value
                .get("product_name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            created_at: value
                .get("created_at")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Whether the server was created within the freshness window.
    ///
    /// A missing or unparseable creation timestamp counts as *within* the
    /// window: a server we cannot age is conservatively treated as new so
    /// it is never skipped.
    pub fn created_within(&self, window: time::Duration, now: OffsetDateTime) -> bool {
        let raw = match &self.created_at {
            Some(s) => s,
            None => return true,
        };
        match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(created) => now - created <= window,
            Err(_) => true,
        }
    }
}

/// Directory ids arrive as either JSON numbers or strings.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
