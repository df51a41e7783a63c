//! The diff-and-apply engine.
//!
//! [`reconcile`] compares a desired-state rule set against the current
//! document and produces a working copy with the minimal set of field
//! changes applied. The full working copy is always returned, compliant or
//! not, so callers can perform a full-document write; whether a zero-change
//! pass still writes is the rule set's [`WritePolicy`](crate::WritePolicy),
//! not the engine's decision.

use serde::Serialize;
use serde_json::Value;

use crate::document::ResourceDocument;
use crate::rule::{Compliance, RuleSet, WritePolicy};

/// One applied (or pending, in dry runs) field change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub field: String,
    pub previous: Option<Value>,
    pub new: Value,
}

impl ChangeRecord {
    /// Render as `field: previous -> new` for summaries.
    pub fn describe(&self) -> String {
        match &self.previous {
            Some(prev) => format!("{}: {} -> {}", self.field, prev, self.new),
            None => format!("{}: (unset) -> {}", self.field, self.new),
        }
    }
}

/// Server-scoped facts the rules are evaluated under.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext {
    /// The server's tier classifier carries an exemption marker; rules
    /// marked exemptable must not fire.
    pub exempt_tier: bool,
}

/// The outcome of one reconciliation pass over one document.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Full working copy, safe to write back whole.
    pub document: ResourceDocument,
    /// Changes applied to the working copy, in rule order.
    pub changes: Vec<ChangeRecord>,
}

impl Reconciliation {
    /// Whether the caller should perform the backend write. A zero-change
    /// pass still writes under [`WritePolicy::Always`]; the change count
    /// alone decides what gets *reported*.
    pub fn needs_write(&self, rules: &RuleSet) -> bool {
        !self.changes.is_empty() || rules.write_policy() == WritePolicy::Always
    }
}

/// Evaluate every rule against the document, applying targets for
/// non-compliant fields to a working copy.
///
/// Rules are independent and evaluated in declared order; rule sets cannot
/// contain two rules for the same field, so order never decides a winner.
pub fn reconcile(
    document: &ResourceDocument,
    rules: &RuleSet,
    ctx: &RuleContext,
) -> Reconciliation {
    let mut working = document.clone();
    let mut changes = Vec::new();

    for rule in rules.rules() {
        if rule.is_exemptable() && ctx.exempt_tier {
            continue;
        }

        match rule.evaluate(working.get(rule.field())) {
            Compliance::Compliant | Compliance::Skipped => {}
            Compliance::NonCompliant => {
                changes.push(ChangeRecord {
                    field: rule.field().to_string(),
                    previous: working.get(rule.field()).cloned(),
                    new: rule.target().clone(),
                });
                working.set(rule.field(), rule.target().clone());
            }
        }
    }

    Reconciliation {
        document: working,
        changes,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Check, MissingPolicy, Rule, WritePolicy};
    use serde_json::json;

    fn disable_rules() -> RuleSet {
        RuleSet::new(
            vec![
                Rule::new("EnableMarkerDetection", json!(false), Check::Equals),
                Rule::new("AutomaticRefreshIntervalDays", json!(0), Check::Equals)
                    .on_missing(MissingPolicy::Compliant),
            ],
            WritePolicy::Always,
        )
        .unwrap()
    }

    #[test]
    fn applies_targets_for_noncompliant_fields() {
        let doc = ResourceDocument::new(json!({
            "EnableMarkerDetection": true,
            "AutomaticRefreshIntervalDays": 30
        }));

        let out = reconcile(&doc, &disable_rules(), &RuleContext::default());

        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.changes[0].field, "EnableMarkerDetection");
        assert_eq!(out.changes[0].previous, Some(json!(true)));
        assert_eq!(out.changes[0].new, json!(false));
        assert_eq!(out.document.get("EnableMarkerDetection"), Some(&json!(false)));
        assert_eq!(out.document.get("AutomaticRefreshIntervalDays"), Some(&json!(0)));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let doc = ResourceDocument::new(json!({"EnableMarkerDetection": true}));
        let rules = disable_rules();

        let first = reconcile(&doc, &rules, &RuleContext::default());
        assert_eq!(first.changes.len(), 1);

        let second = reconcile(&first.document, &rules, &RuleContext::default());
        assert!(second.changes.is_empty());
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn missing_field_with_default_assumed_bad_is_set() {
        // An absent flag the backend defaults to enabled still produces a
        // change record with no previous value.
        let doc = ResourceDocument::new(json!({}));
        let rules = RuleSet::new(
            vec![Rule::new("EnableChapterImageExtraction", json!(false), Check::Equals)],
            WritePolicy::Always,
        )
        .unwrap();

        let out = reconcile(&doc, &rules, &RuleContext::default());
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].previous, None);
        assert_eq!(out.document.get("EnableChapterImageExtraction"), Some(&json!(false)));
    }

    #[test]
    fn exemptable_rules_do_not_fire_for_exempt_tier() {
        let doc = ResourceDocument::new(json!({
            "IntervalTicks": 0,
            "EnableMarkerDetection": true
        }));
        let rules = RuleSet::new(
            vec![
                Rule::new("IntervalTicks", json!(108_000_000_000i64), Check::MinInt(108_000_000_000))
                    .exemptable(),
                Rule::new("EnableMarkerDetection", json!(false), Check::Equals),
            ],
            WritePolicy::OnChange,
        )
        .unwrap();

        let out = reconcile(&doc, &rules, &RuleContext { exempt_tier: true });
        // the exemptable rule is suppressed; the plain rule still fires
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].field, "EnableMarkerDetection");
        assert_eq!(out.document.get("IntervalTicks"), Some(&json!(0)));

        let out = reconcile(&doc, &rules, &RuleContext { exempt_tier: false });
        assert_eq!(out.changes.len(), 2);
    }

    #[test]
    fn zero_change_pass_still_requests_write_under_always() {
        let doc = ResourceDocument::new(json!({"EnableMarkerDetection": false}));
        let rules = RuleSet::new(
            vec![Rule::new("EnableMarkerDetection", json!(false), Check::Equals)],
            WritePolicy::Always,
        )
        .unwrap();

        let out = reconcile(&doc, &rules, &RuleContext::default());
        assert!(out.changes.is_empty());
        assert!(out.needs_write(&rules));

        let on_change = RuleSet::new(
            vec![Rule::new("EnableMarkerDetection", json!(false), Check::Equals)],
            WritePolicy::OnChange,
        )
        .unwrap();
        let out = reconcile(&doc, &on_change, &RuleContext::default());
        assert!(!out.needs_write(&on_change));
    }

    #[test]
    fn end_to_end_classifier_scenario() {
        // Field X=true, rule "X must be false unless the tier is exempt".
        let doc = ResourceDocument::new(json!({"X": true}));
        let rules = RuleSet::new(
            vec![Rule::new("X", json!(false), Check::Equals).exemptable()],
            WritePolicy::Always,
        )
        .unwrap();

        // classifier "standard": the rule fires
        let out = reconcile(&doc, &rules, &RuleContext { exempt_tier: false });
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].previous, Some(json!(true)));
        assert_eq!(out.document.get("X"), Some(&json!(false)));

        // classifier "unlimited-Z": no change, but the write still happens
        let out = reconcile(&doc, &rules, &RuleContext { exempt_tier: true });
        assert!(out.changes.is_empty());
        assert_eq!(out.document.get("X"), Some(&json!(true)));
        assert!(out.needs_write(&rules));
    }

    #[test]
    fn rooted_document_round_trips_whole() {
        let body = json!({
            "Name": "Movies",
            "ItemId": "lib-1",
            "LibraryOptions": {"EnableMarkerDetection": true, "PathInfos": ["/data"]}
        });
        let doc = ResourceDocument::with_root(body, "LibraryOptions");
        let rules = RuleSet::new(
            vec![Rule::new("EnableMarkerDetection", json!(false), Check::Equals)],
            WritePolicy::Always,
        )
        .unwrap();

        let out = reconcile(&doc, &rules, &RuleContext::default());
        // sibling data outside the field root is untouched
        assert_eq!(out.document.body()["ItemId"], json!("lib-1"));
        assert_eq!(out.document.body()["LibraryOptions"]["PathInfos"], json!(["/data"]));
        assert_eq!(
            out.document.body()["LibraryOptions"]["EnableMarkerDetection"],
            json!(false)
        );
    }
}
