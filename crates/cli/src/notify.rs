//! Run-summary formatting and fire-and-forget webhook delivery.
//!
//! The notifier never blocks or fails reconciliation: a missing webhook
//! URL disables delivery, and any send error is logged and swallowed.

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::runner::RunSummary;

/// The sink rejects oversized payloads; content is truncated to fit.
pub const MAX_CONTENT_CHARS: usize = 1900;

const TRUNCATION_MARKER: &str = "\n...[summary truncated]";

/// How many changed servers get itemised before the summary collapses the
/// rest into a count.
const DETAIL_SERVER_LIMIT: usize = 3;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    content: &'a str,
}

pub struct Notifier {
    webhook_url: Option<String>,
    agent: ureq::Agent,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(SEND_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Notifier {
            webhook_url,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Post the summary. Best effort: logs and returns on any failure.
    pub fn send(&self, summary: &RunSummary) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let content = truncate_content(&format_summary(summary), MAX_CONTENT_CHARS);
        let payload = WebhookPayload {
            username: "Refrain Fleet Bot",
            content: &content,
        };

        match self.agent.post(url).send_json(&payload) {
            Ok(response) if matches!(response.status().as_u16(), 200 | 204) => {}
            Ok(response) => {
                warn!(status = response.status().as_u16(), "notification rejected");
            }
            Err(err) => {
                warn!(error = %err, "notification delivery failed");
            }
        }
    }
}

/// Render a run summary for humans (stdout and the webhook share this).
pub fn format_summary(summary: &RunSummary) -> String {
    let mode = if summary.new_only {
        "new servers only"
    } else {
        "all servers"
    };

    let mut out = String::new();
    if summary.dry_run {
        out.push_str(&format!(
            "{} reconciliation dry run - {}\n",
            summary.family, mode
        ));
    } else {
        out.push_str(&format!(
            "{} reconciliation complete - {}\n",
            summary.family, mode
        ));
    }
    out.push_str(&format!(
        "Servers processed: {}/{}\n",
        summary.servers_processed, summary.servers_considered
    ));
    out.push_str(&format!("Servers changed: {}\n", summary.changed.len()));
    out.push_str(&format!("Changes applied: {}\n", summary.total_changes));
    if !summary.fleet_complete {
        out.push_str("Warning: fleet listing was incomplete (directory rate limiting)\n");
    }

    if summary.changed.is_empty() {
        out.push_str("No changes needed - fleet already compliant\n");
        return out;
    }

    out.push('\n');
    for server in summary.changed.iter().take(DETAIL_SERVER_LIMIT) {
        out.push_str(&format!("{} ({}):\n", server.name, server.owner));
        for change in &server.changes {
            out.push_str(&format!("  - {change}\n"));
        }
    }
    if summary.changed.len() > DETAIL_SERVER_LIMIT {
        out.push_str(&format!(
            "... and {} more servers changed\n",
            summary.changed.len() - DETAIL_SERVER_LIMIT
        ));
    }

    out
}

/// Clamp to the sink's character budget, appending a marker when cut.
pub fn truncate_content(content: &str, budget: usize) -> String {
    if content.chars().count() <= budget {
        return content.to_string();
    }

    let keep = budget.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ServerOutcome;
    use refrain_core::Family;

    fn summary(changed: Vec<ServerOutcome>) -> RunSummary {
        let total = changed.iter().map(|s| s.changes.len()).sum();
        RunSummary {
            family: Family::Plex,
            new_only: false,
            dry_run: false,
            fleet_complete: true,
            servers_considered: 10,
            servers_processed: 10,
            changed,
            total_changes: total,
        }
    }

    fn outcome(name: &str, changes: &[&str]) -> ServerOutcome {
        ServerOutcome {
            id: name.to_string(),
            name: name.to_string(),
            owner: "owner".to_string(),
            changes: changes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn no_change_summary_says_so() {
        let text = format_summary(&summary(Vec::new()));
        assert!(text.contains("plex reconciliation complete - all servers"));
        assert!(text.contains("Servers processed: 10/10"));
        assert!(text.contains("No changes needed"));
    }

    #[test]
    fn details_collapse_after_the_sample() {
        let changed = (0..5)
            .map(|i| outcome(&format!("srv-{i}"), &["prefs: X: \"1\" -> \"0\""]))
            .collect();
        let text = format_summary(&summary(changed));

        assert!(text.contains("srv-0 (owner):"));
        assert!(text.contains("srv-2 (owner):"));
        assert!(!text.contains("srv-3 (owner):"));
        assert!(text.contains("... and 2 more servers changed"));
    }

    #[test]
    fn truncation_respects_the_budget() {
        let long = "x".repeat(5000);
        let cut = truncate_content(&long, MAX_CONTENT_CHARS);
        assert!(cut.chars().count() <= MAX_CONTENT_CHARS);
        assert!(cut.ends_with(TRUNCATION_MARKER));

        let short = "all good";
        assert_eq!(truncate_content(short, MAX_CONTENT_CHARS), "all good");
    }

    #[test]
    fn dry_run_is_labelled() {
        let mut s = summary(Vec::new());
        s.dry_run = true;
        assert!(format_summary(&s).contains("dry run"));
    }
}
