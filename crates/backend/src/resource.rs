//! Resource selectors and write reports.
//!
//! A [`Resource`] addresses one configuration document on one server. The
//! selectors encode the addressing rules that matter for correctness:
//! library documents are *looked up by name* but *written by stable id* --
//! name-addressed writes are the documented cause of duplicate-resource
//! creation on the JSON backend.

use refrain_core::{ChangeRecord, ResourceKind};

/// Address of one configuration document on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// A library's options bundle. `name` is used on read, `id` on write.
    Library { name: String, id: String },
    /// The server-wide settings document.
    ServerSettings,
    /// The transcoding/encoding settings document.
    EncodingSettings,
    /// A scheduled task's interval configuration.
    TaskSchedule { task_id: String },
    /// A scheduled task's trigger list.
    TaskTriggers { task_id: String },
    /// A user's permission policy.
    UserPolicy { user_id: String },
    /// A user's home-screen layout.
    UserHomeScreen { user_id: String },
    /// The flat server preference listing (XML family).
    Preferences,
}

/// One reconcilable resource discovered on a server, paired with the rule
/// table that governs it.
#[derive(Debug, Clone)]
pub struct Target {
    pub kind: ResourceKind,
    pub resource: Resource,
    /// Human-facing name, used for exclusion-marker matching and logs.
    pub name: String,
}

/// Outcome of a single write call (document-level or one field).
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Applied,
    /// The server refused the write.
    Rejected { status: u16 },
    /// The call itself failed (timeout, connection error).
    Failed { reason: String },
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// How a write landed. The JSON family writes the whole document once; the
/// XML family writes each changed field independently, so partial success
/// is possible and must be reported per field.
#[derive(Debug, Clone)]
pub enum WriteReport {
    Document(WriteOutcome),
    Fields(Vec<FieldWrite>),
}

/// One field-level write result.
#[derive(Debug, Clone)]
pub struct FieldWrite {
    pub field: String,
    pub outcome: WriteOutcome,
}

impl WriteReport {
    /// True when every write in the report landed.
    pub fn fully_applied(&self) -> bool {
        match self {
            WriteReport::Document(outcome) => outcome.is_applied(),
            WriteReport::Fields(fields) => fields.iter().all(|f| f.outcome.is_applied()),
        }
    }

    /// How many of the pass's change records actually reached the server.
    pub fn applied_changes(&self, changes: &[ChangeRecord]) -> usize {
        match self {
            WriteReport::Document(outcome) if outcome.is_applied() => changes.len(),
            WriteReport::Document(_) => 0,
            WriteReport::Fields(fields) => {
                fields.iter().filter(|f| f.outcome.is_applied()).count()
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(field: &str) -> ChangeRecord {
        ChangeRecord {
            field: field.to_string(),
            previous: Some(json!("1")),
            new: json!("0"),
        }
    }

    #[test]
    fn document_report_counts_all_or_nothing() {
        let changes = vec![change("A"), change("B")];

        let ok = WriteReport::Document(WriteOutcome::Applied);
        assert!(ok.fully_applied());
        assert_eq!(ok.applied_changes(&changes), 2);

        let refused = WriteReport::Document(WriteOutcome::Rejected { status: 400 });
        assert!(!refused.fully_applied());
        assert_eq!(refused.applied_changes(&changes), 0);
    }

    #[test]
    fn field_report_counts_partial_success() {
        let changes = vec![change("A"), change("B")];
        let report = WriteReport::Fields(vec![
            FieldWrite {
                field: "A".to_string(),
                outcome: WriteOutcome::Applied,
            },
            FieldWrite {
                field: "B".to_string(),
                outcome: WriteOutcome::Rejected { status: 403 },
            },
        ]);

        assert!(!report.fully_applied());
        assert_eq!(report.applied_changes(&changes), 1);
    }
}
