//! Desired-state rules: a target value plus a compliance predicate for one
//! configuration field.
//!
//! Compliance is not simple equality -- "disabled" on some backends means
//! the value is any of `"never"` or `"0"`, and interval fields are
//! compliant whenever they meet a minimum. Each rule also declares how to
//! treat a document that has no value for the field at all, because the
//! backends disagree about defaults: some default an absent flag to an
//! undesired value, some omit settings a given server build does not
//! support.

use serde_json::Value;
use std::collections::HashSet;

/// How a rule treats a document with no value for its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// The setting is not supported by this server; leave it alone.
    Skip,
    /// The backend defaults an absent field to an undesired value.
    NonCompliant,
    /// The backend default already matches the policy.
    Compliant,
}

/// The compliance predicate for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Compliant iff the current value equals the rule's target.
    Equals,
    /// Compliant iff the current value differs from the given value.
    NotEquals(Value),
    /// Compliant iff the current value is any of the given values.
    AnyOf(Vec<Value>),
    /// Compliant iff the value is an integer (or numeric string) at or
    /// above the bound.
    MinInt(i64),
}

/// Result of evaluating a rule's predicate against a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compliance {
    Compliant,
    NonCompliant,
    /// The field is absent and the rule's missing policy is [`MissingPolicy::Skip`].
    Skipped,
}

/// A desired-state rule for one configuration field.
#[derive(Debug, Clone)]
pub struct Rule {
    field: String,
    target: Value,
    check: Check,
    on_missing: MissingPolicy,
    exemptable: bool,
}

impl Rule {
    /// A rule with the default missing policy ([`MissingPolicy::NonCompliant`])
    /// that fires for every server tier.
    pub fn new(field: impl Into<String>, target: Value, check: Check) -> Self {
        Rule {
            field: field.into(),
            target,
            check,
            on_missing: MissingPolicy::NonCompliant,
            exemptable: false,
        }
    }

    /// Override how an absent field is treated.
    pub fn on_missing(mut self, policy: MissingPolicy) -> Self {
        self.on_missing = policy;
        self
    }

    /// Mark the rule as suppressed for exempt-tier servers.
    pub fn exemptable(mut self) -> Self {
        self.exemptable = true;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn is_exemptable(&self) -> bool {
        self.exemptable
    }

    /// Evaluate the compliance predicate against the current field value.
    pub fn evaluate(&self, current: Option<&Value>) -> Compliance {
        let value = match current {
            Some(v) => v,
            None => {
                return match self.on_missing {
                    MissingPolicy::Skip => Compliance::Skipped,
                    MissingPolicy::NonCompliant => Compliance::NonCompliant,
                    MissingPolicy::Compliant => Compliance::Compliant,
                }
            }
        };

        let compliant = match &self.check {
            Check::Equals => *value == self.target,
            Check::NotEquals(other) => *value != *other,
            Check::AnyOf(allowed) => allowed.iter().any(|v| v == value),
            Check::MinInt(bound) => match as_int(value) {
                Some(n) => n >= *bound,
                // unparseable counts as non-compliant so the target is applied
                None => false,
            },
        };

        if compliant {
            Compliance::Compliant
        } else {
            Compliance::NonCompliant
        }
    }
}

/// Interpret a JSON value as an integer, accepting numeric strings (the
/// XML-preferences backend reports every value as a string).
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// RuleSet
// ──────────────────────────────────────────────

/// Whether a reconciliation pass writes the document back even when no
/// field changed.
///
/// `Always` is a real contract requirement, not an optimization miss: one
/// backend relies on the update call happening every run to keep the
/// resource's write path exercised and guard against drift from external
/// resets. Zero-change passes still perform the network write but are
/// reported as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    Always,
    OnChange,
}

/// An ordered set of rules for one resource kind.
///
/// Construction rejects two rules targeting the same field: the source
/// policy left same-field conflicts to evaluation order, which silently
/// picks a winner. Here an ambiguous set is unrepresentable.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    write_policy: WritePolicy,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, write_policy: WritePolicy) -> Result<Self, RuleSetError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.field.clone()) {
                return Err(RuleSetError::DuplicateField {
                    field: rule.field.clone(),
                });
            }
        }
        Ok(RuleSet { rules, write_policy })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }
}

/// Errors raised when building a rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    /// Two rules target the same field; evaluation order would silently
    /// decide which wins.
    #[error("duplicate rule target for field '{field}'")]
    DuplicateField { field: String },
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
