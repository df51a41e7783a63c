//! refrain-fleet: client for the fleet directory service.
//!
//! Covers the three directory concerns the reconciler has: exhaustive
//! paginated discovery with bounded rate-limit backoff, fresh-credential
//! fallback, and the (explicitly operator-invoked) restart endpoints.

pub mod credentials;
pub mod directory;
pub mod fetch;
pub mod record;

pub use credentials::fresh_credential;
pub use directory::{Directory, DirectoryError, HttpDirectory};
pub use fetch::{fetch_all, FetchConfig, FetchReport};
pub use record::ServiceRecord;
