//! refrain-core: document model, desired-state rules, and the
//! diff-and-apply engine.
//!
//! The engine is deliberately pure: it never performs I/O. Adapters hand it
//! a [`ResourceDocument`], it returns a working copy plus the change
//! records, and the caller decides (per the rule set's [`WritePolicy`])
//! whether a backend write happens.

pub mod document;
pub mod engine;
pub mod policy;
pub mod rule;

pub use document::ResourceDocument;
pub use engine::{reconcile, ChangeRecord, Reconciliation, RuleContext};
pub use policy::{Family, Policy, ResourceKind};
pub use rule::{Check, MissingPolicy, Rule, RuleSet, RuleSetError, WritePolicy};
