//! refrain-state: local run-state tracking.
//!
//! Two append-only text logs under the state directory: the processed-
//! server log that powers new-only runs, and the token cache that lets a
//! run reuse connection details that worked last time. Single writer, no
//! concurrent readers; both formats are opaque to the reconciliation core
//! and substitutable with any key-value store.

pub mod error;
pub mod runlog;
pub mod tokens;

pub use error::StateError;
pub use runlog::RunLog;
pub use tokens::{CachedConnection, TokenCache};
