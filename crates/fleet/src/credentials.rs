//! Fresh-credential fallback against the directory service.
//!
//! The resolver never fails past this boundary: it returns *some*
//! credential (possibly the stale one it was given), leaving failure
//! detection to the caller's next backend read.

use std::time::Duration;

use tracing::{debug, warn};

use crate::directory::{Directory, DirectoryError};

/// Fetch a freshly issued credential for a service, falling back to the
/// cached one on any failure.
///
/// A short fixed delay runs before the request to reduce burst load on the
/// directory; callers pass it in so tests stay fast.
pub fn fresh_credential(
    directory: &dyn Directory,
    service_id: &str,
    cached: Option<&str>,
    delay: Duration,
) -> Option<String> {
    std::thread::sleep(delay);

    match directory.fetch_service(service_id) {
        Ok(record) => match record.credential {
            Some(fresh) => {
                debug!(service = service_id, "fresh credential issued");
                Some(fresh)
            }
            None => {
                warn!(service = service_id, "directory returned no credential, keeping cached");
                cached.map(str::to_string)
            }
        },
        Err(DirectoryError::RateLimited) => {
            warn!(service = service_id, "rate limited on credential refresh, keeping cached");
            cached.map(str::to_string)
        }
        Err(err) => {
            warn!(service = service_id, error = %err, "credential refresh failed, keeping cached");
            cached.map(str::to_string)
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ServiceRecord;
    use refrain_core::Family;

    struct OneService {
        record: Result<ServiceRecord, DirectoryError>,
    }

    impl Directory for OneService {
        fn list_page(
            &self,
            _page: u32,
            _per_page: u32,
        ) -> Result<Vec<ServiceRecord>, DirectoryError> {
            Ok(Vec::new())
        }

        fn fetch_service(&self, _id: &str) -> Result<ServiceRecord, DirectoryError> {
            match &self.record {
                Ok(r) => Ok(r.clone()),
                Err(DirectoryError::RateLimited) => Err(DirectoryError::RateLimited),
                Err(_) => Err(DirectoryError::Status { status: 500 }),
            }
        }

        fn restart(&self, _id: &str, _family: Family) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    fn record(credential: Option<&str>) -> ServiceRecord {
        ServiceRecord {
            id: "7".to_string(),
            display_name: "srv-7".to_string(),
            owner: "owner".to_string(),
            family: Family::Emby,
            host: None,
            port: None,
            credential: credential.map(str::to_string),
            classifier: String::new(),
            created_at: None,
        }
    }

    const NO_DELAY: Duration = Duration::ZERO;

    #[test]
    fn returns_fresh_credential_when_available() {
        let dir = OneService {
            record: Ok(record(Some("fresh"))),
        };
        let got = fresh_credential(&dir, "7", Some("stale"), NO_DELAY);
        assert_eq!(got.as_deref(), Some("fresh"));
    }

    #[test]
    fn falls_back_to_cached_when_directory_has_none() {
        let dir = OneService {
            record: Ok(record(None)),
        };
        let got = fresh_credential(&dir, "7", Some("stale"), NO_DELAY);
        assert_eq!(got.as_deref(), Some("stale"));
    }

    #[test]
    fn falls_back_to_cached_on_rate_limit() {
        let dir = OneService {
            record: Err(DirectoryError::RateLimited),
        };
        let got = fresh_credential(&dir, "7", Some("stale"), NO_DELAY);
        assert_eq!(got.as_deref(), Some("stale"));
    }

    #[test]
    fn no_cached_and_no_fresh_yields_none() {
        let dir = OneService {
            record: Err(DirectoryError::Status { status: 500 }),
        };
        assert_eq!(fresh_credential(&dir, "7", None, NO_DELAY), None);
    }
}
