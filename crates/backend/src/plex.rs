//! Adapter for the XML-preference backend family.
//!
//! The server exposes a flat preference listing as XML and takes writes as
//! form-encoded single-field PUTs -- there is no bulk document write and no
//! JSON anywhere. The credential travels as a query parameter. Because each
//! field is written independently, a reconciliation pass can partially
//! succeed, and the report says so per field.

use std::time::Duration;

use refrain_core::{ChangeRecord, Family, ResourceDocument, ResourceKind};
use serde_json::Value;
use tracing::warn;

use crate::error::BackendError;
use crate::resource::{FieldWrite, Resource, Target, WriteOutcome, WriteReport};
use crate::{agent_with_timeout, urlencoded, MediaBackend};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PlexApi {
    base_url: String,
    token: String,
    agent: ureq::Agent,
    probe_agent: ureq::Agent,
}

impl PlexApi {
    pub fn new(host: &str, port: u16, token: &str) -> Self {
        PlexApi {
            base_url: format!("http://{host}:{port}"),
            token: token.to_string(),
            agent: agent_with_timeout(READ_TIMEOUT),
            probe_agent: agent_with_timeout(PROBE_TIMEOUT),
        }
    }

    fn prefs_url(&self) -> String {
        format!("{}/:/prefs?X-Plex-Token={}", self.base_url, urlencoded(&self.token))
    }

    fn put_setting(&self, field: &str, value: &str) -> WriteOutcome {
        let body = format!("{}={}", urlencoded(field), urlencoded(value));
        let result = self
            .agent
            .put(&self.prefs_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send(body.as_bytes());

        match result {
            Ok(response) => match response.status().as_u16() {
                200 => WriteOutcome::Applied,
                status => WriteOutcome::Rejected { status },
            },
            Err(err) => WriteOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

impl MediaBackend for PlexApi {
    fn family(&self) -> Family {
        Family::Plex
    }

    fn probe(&self) -> bool {
        match self.probe_agent.get(&self.prefs_url()).call() {
            Ok(response) => response.status().as_u16() == 200,
            Err(_) => false,
        }
    }

    fn discover(&self, _exempt_tier: bool) -> Result<Vec<Target>, BackendError> {
        // the whole backend surface is one flat preference document
        Ok(vec![Target {
            kind: ResourceKind::Preferences,
            resource: Resource::Preferences,
            name: "server preferences".to_string(),
        }])
    }

    fn read(&self, resource: &Resource) -> Result<ResourceDocument, BackendError> {
        if *resource != Resource::Preferences {
            return Err(BackendError::Unsupported);
        }

        let response = self
            .agent
            .get(&self.prefs_url())
            .call()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(BackendError::NotFound),
            status => return Err(BackendError::Status { status }),
        }

        let xml = response
            .into_body()
            .read_to_string()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let settings = parse_prefs(&xml)?;
        Ok(ResourceDocument::from_fields(
            settings
                .into_iter()
                .map(|(id, value)| (id, Value::String(value))),
        ))
    }

    fn write(
        &self,
        resource: &Resource,
        _document: &ResourceDocument,
        changes: &[ChangeRecord],
    ) -> Result<WriteReport, BackendError> {
        if *resource != Resource::Preferences {
            return Err(BackendError::Unsupported);
        }

        // one PUT per changed field; a rejected field never blocks the rest
        let mut fields = Vec::with_capacity(changes.len());
        for change in changes {
            let value = form_value(&change.new);
            let outcome = self.put_setting(&change.field, &value);
            if !outcome.is_applied() {
                warn!(field = %change.field, outcome = ?outcome, "preference write did not land");
            }
            fields.push(FieldWrite {
                field: change.field.clone(),
                outcome,
            });
        }

        Ok(WriteReport::Fields(fields))
    }

    fn supports_field_writes(&self) -> bool {
        true
    }
}

/// Extract `<Setting id value>` pairs from a preference listing.
pub(crate) fn parse_prefs(xml: &str) -> Result<Vec<(String, String)>, BackendError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut settings = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() != b"Setting" {
                    continue;
                }

                let mut id = None;
                let mut value = None;
                for attr in e.attributes().flatten() {
                    let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                    match key {
                        "id" => id = Some(attr.unescape_value().unwrap_or_default().to_string()),
                        "value" => {
                            value = Some(attr.unescape_value().unwrap_or_default().to_string());
                        }
                        _ => {}
                    }
                }
                if let Some(id) = id {
                    settings.push((id, value.unwrap_or_default()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(BackendError::Malformed(e.to_string())),
            _ => {}
        }
    }

    Ok(settings)
}

/// Render a JSON target value as a form field value. Preference targets are
/// strings already; anything else falls back to its JSON rendering.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PREFS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="3">
  <Setting id="GenerateBIFBehavior" label="Generate video preview thumbnails" value="scheduled" default="scheduled" type="text" />
  <Setting id="ScheduledLibraryUpdateInterval" label="Library scan interval" value="3600" default="86400" type="int" />
  <Setting id="FriendlyName" label="Friendly name" value="Duck &amp; Cover" default="" type="text" />
</MediaContainer>"#;

    #[test]
    fn parses_settings_with_unescaped_values() {
        let settings = parse_prefs(PREFS).unwrap();
        assert_eq!(settings.len(), 3);
        assert_eq!(
            settings[0],
            ("GenerateBIFBehavior".to_string(), "scheduled".to_string())
        );
        assert_eq!(settings[2].1, "Duck & Cover");
    }

    #[test]
    fn parsed_settings_become_a_flat_document() {
        let settings = parse_prefs(PREFS).unwrap();
        let doc = ResourceDocument::from_fields(
            settings
                .into_iter()
                .map(|(id, value)| (id, Value::String(value))),
        );
        assert_eq!(
            doc.get("ScheduledLibraryUpdateInterval"),
            Some(&json!("3600"))
        );
    }

    #[test]
    fn setting_without_value_defaults_to_empty() {
        let xml = r#"<MediaContainer><Setting id="Bare" /></MediaContainer>"#;
        let settings = parse_prefs(xml).unwrap();
        assert_eq!(settings, vec![("Bare".to_string(), String::new())]);
    }

    #[test]
    fn truncated_xml_is_malformed() {
        let xml = r#"<MediaContainer><Setting id="A" value="1""#;
        assert!(matches!(
            parse_prefs(xml),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn form_values_render_without_json_quoting() {
        assert_eq!(form_value(&json!("never")), "never");
        assert_eq!(form_value(&json!(7200)), "7200");
    }
}
