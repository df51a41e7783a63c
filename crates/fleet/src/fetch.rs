//! Paginated fleet fetch with bounded rate-limit backoff.
//!
//! Partial fleet visibility is preferred over total failure: when the
//! retry ceiling is exceeded, or a page comes back malformed, the fetch
//! returns whatever was accumulated and marks the report incomplete rather
//! than failing the whole run.

use std::time::Duration;

use tracing::warn;

use crate::directory::{Directory, DirectoryError};
use crate::record::ServiceRecord;

/// Tuning knobs for the paginated fetch. Delays are `Duration`s so tests
/// can run the full schedule in milliseconds.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub per_page: u32,
    /// Attempts per page when rate limited (requests, not extra retries).
    pub max_attempts: u32,
    /// Initial backoff after a rate-limit response; doubles per attempt
    /// and resets after a successful page.
    pub base_backoff: Duration,
    /// Fixed pause between successful page fetches, to avoid triggering
    /// rate limits proactively.
    pub page_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            per_page: 100,
            max_attempts: 3,
            base_backoff: Duration::from_secs(5),
            page_delay: Duration::from_secs(2),
        }
    }
}

/// What a fetch actually did, alongside the records it gathered.
#[derive(Debug)]
pub struct FetchReport {
    pub services: Vec<ServiceRecord>,
    pub pages: u32,
    pub rate_limit_retries: u32,
    /// Total time slept in rate-limit backoff.
    pub backoff_total: Duration,
    /// False when the fetch gave up early and the listing may be partial.
    pub complete: bool,
}

/// Walk every page of the directory listing until an empty page.
pub fn fetch_all(directory: &dyn Directory, cfg: &FetchConfig) -> FetchReport {
    let mut report = FetchReport {
        services: Vec::new(),
        pages: 0,
        rate_limit_retries: 0,
        backoff_total: Duration::ZERO,
        complete: true,
    };

    let mut page = 1u32;
    let mut backoff = cfg.base_backoff;

    'pages: loop {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match directory.list_page(page, cfg.per_page) {
                Ok(services) => {
                    if services.is_empty() {
                        break 'pages;
                    }
                    report.services.extend(services);
                    report.pages += 1;
                    page += 1;
                    backoff = cfg.base_backoff;
                    std::thread::sleep(cfg.page_delay);
                    break;
                }
                Err(DirectoryError::RateLimited) => {
                    if attempt >= cfg.max_attempts {
                        warn!(
                            page,
                            accumulated = report.services.len(),
                            "rate limited past the retry ceiling, keeping partial fleet"
                        );
                        report.complete = false;
                        break 'pages;
                    }
                    warn!(page, attempt, backoff_ms = backoff.as_millis() as u64, "rate limited, backing off");
                    report.rate_limit_retries += 1;
                    std::thread::sleep(backoff);
                    report.backoff_total += backoff;
                    backoff *= 2;
                }
                Err(err) => {
                    warn!(page, error = %err, "fleet listing aborted, keeping partial fleet");
                    report.complete = false;
                    break 'pages;
                }
            }
        }
    }

    report
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use refrain_core::Family;
    use std::cell::RefCell;

    fn svc(id: &str) -> ServiceRecord {
        ServiceRecord {
            id: id.to_string(),
            display_name: format!("srv-{id}"),
            owner: "owner".to_string(),
            family: Family::Emby,
            host: Some("10.0.0.1".to_string()),
            port: Some(8096),
            credential: Some("tok".to_string()),
            classifier: "Standard".to_string(),
            created_at: None,
        }
    }

    /// Directory stub that replays a fixed script of `list_page` results.
    struct Scripted {
        responses: RefCell<Vec<Result<Vec<ServiceRecord>, DirectoryError>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Vec<ServiceRecord>, DirectoryError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Scripted {
                responses: RefCell::new(responses),
            }
        }
    }

    impl Directory for Scripted {
        fn list_page(
            &self,
            _page: u32,
            _per_page: u32,
        ) -> Result<Vec<ServiceRecord>, DirectoryError> {
            self.responses
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn fetch_service(&self, _id: &str) -> Result<ServiceRecord, DirectoryError> {
            Err(DirectoryError::Status { status: 404 })
        }

        fn restart(&self, _id: &str, _family: Family) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    fn fast_cfg() -> FetchConfig {
        FetchConfig {
            per_page: 100,
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            page_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn walks_pages_until_empty() {
        let dir = Scripted::new(vec![
            Ok(vec![svc("1"), svc("2")]),
            Ok(vec![svc("3")]),
            Ok(vec![]),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(report.complete);
        assert_eq!(report.pages, 2);
        let ids: Vec<_> = report.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn retries_rate_limited_page_with_backoff_schedule() {
        // page 2 rate-limits twice, then succeeds on the third attempt
        let dir = Scripted::new(vec![
            Ok(vec![svc("1")]),
            Err(DirectoryError::RateLimited),
            Err(DirectoryError::RateLimited),
            Ok(vec![svc("2")]),
            Ok(vec![]),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(report.complete);
        assert_eq!(report.rate_limit_retries, 2);
        // backoff slept exactly base + 2*base
        assert_eq!(report.backoff_total, Duration::from_millis(5 + 10));

        // no duplicated or missing records
        let ids: Vec<_> = report.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn gives_up_after_retry_ceiling_with_partial_fleet() {
        let dir = Scripted::new(vec![
            Ok(vec![svc("1")]),
            Err(DirectoryError::RateLimited),
            Err(DirectoryError::RateLimited),
            Err(DirectoryError::RateLimited),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(!report.complete);
        assert_eq!(report.services.len(), 1);
        // two sleeps happened before the third attempt failed the page
        assert_eq!(report.rate_limit_retries, 2);
        assert_eq!(report.backoff_total, Duration::from_millis(5 + 10));
    }

    #[test]
    fn malformed_page_aborts_with_accumulated_records() {
        let dir = Scripted::new(vec![
            Ok(vec![svc("1")]),
            Err(DirectoryError::Malformed("bad json".to_string())),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(!report.complete);
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.backoff_total, Duration::ZERO);
    }

    #[test]
    fn unexpected_status_aborts_with_accumulated_records() {
        let dir = Scripted::new(vec![
            Ok(vec![svc("1")]),
            Ok(vec![svc("2")]),
            Err(DirectoryError::Status { status: 500 }),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(!report.complete);
        assert_eq!(report.services.len(), 2);
    }

    #[test]
    fn backoff_resets_between_pages() {
        // page 1 needs one retry; page 2 also rate-limits once -- the
        // second page's backoff starts from base again
        let dir = Scripted::new(vec![
            Err(DirectoryError::RateLimited),
            Ok(vec![svc("1")]),
            Err(DirectoryError::RateLimited),
            Ok(vec![svc("2")]),
            Ok(vec![]),
        ]);

        let report = fetch_all(&dir, &fast_cfg());
        assert!(report.complete);
        assert_eq!(report.backoff_total, Duration::from_millis(5 + 5));
    }
}
