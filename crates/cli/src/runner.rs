//! Per-family reconciliation runner.
//!
//! Drives the full control flow for one backend family: fetch the fleet,
//! select servers for the requested mode, and for each server resolve a
//! working connection, enumerate its resources, and run read → diff →
//! write passes. Every failure is contained to the server (or resource) it
//! happened on; the worst outcome for any single server is "zero changes".

use std::time::Duration;

use refrain_backend::{MediaBackend, Target, WriteReport};
use refrain_core::{reconcile, Family, Policy, RuleContext};
use refrain_fleet::{fetch_all, fresh_credential, Directory, FetchConfig, ServiceRecord};
use refrain_state::{CachedConnection, RunLog, TokenCache};
use time::OffsetDateTime;
use tracing::{info, warn};

/// How long a newly created server stays "new" for selection purposes.
pub const FRESHNESS_WINDOW: time::Duration = time::Duration::hours(72);

/// Pause before asking the directory for a fresh credential.
pub const FRESH_CREDENTIAL_DELAY: Duration = Duration::from_millis(500);

/// Builds the backend adapter for a server once a connection is resolved.
/// Injected so the runner is testable without a live server.
pub type BackendFactory<'a> = &'a dyn Fn(&ServiceRecord, &CachedConnection) -> Box<dyn MediaBackend>;

/// Execution-mode switches, selected by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Only servers not previously reconciled, plus recently created ones.
    pub new_only: bool,
    /// Evaluate and report without writing or recording anything.
    pub dry_run: bool,
}

/// What happened on one server.
#[derive(Debug, Clone)]
pub struct ServerOutcome {
    pub id: String,
    pub name: String,
    pub owner: String,
    /// Human-readable descriptions of the changes that actually landed.
    pub changes: Vec<String>,
}

/// Aggregate of one family's run, consumed by the notifier and stdout.
#[derive(Debug)]
pub struct RunSummary {
    pub family: Family,
    pub new_only: bool,
    pub dry_run: bool,
    /// False when the fleet listing was cut short (rate limiting etc.).
    pub fleet_complete: bool,
    /// Servers of this family the directory reported.
    pub servers_considered: usize,
    /// Servers actually selected and processed in this mode.
    pub servers_processed: usize,
    /// Outcomes for servers where at least one change landed.
    pub changed: Vec<ServerOutcome>,
    pub total_changes: usize,
}

pub struct Runner<'a> {
    pub directory: &'a dyn Directory,
    pub backend_factory: BackendFactory<'a>,
    pub policy: &'a Policy,
    pub run_log: RunLog,
    pub token_cache: TokenCache,
    pub options: RunOptions,
    pub fetch: FetchConfig,
    pub fresh_delay: Duration,
    pub freshness_window: time::Duration,
}

impl Runner<'_> {
    /// Reconcile every selected server of one family.
    pub fn run(&self, family: Family) -> RunSummary {
        info!(%family, "fetching fleet listing");
        let report = fetch_all(self.directory, &self.fetch);
        let fleet: Vec<ServiceRecord> = report
            .services
            .into_iter()
            .filter(|s| s.family == family)
            .collect();

        let considered = fleet.len();
        let selected = self.select_servers(fleet, OffsetDateTime::now_utc());
        info!(
            %family,
            selected = selected.len(),
            considered,
            complete = report.complete,
            "fleet selected"
        );

        let mut summary = RunSummary {
            family,
            new_only: self.options.new_only,
            dry_run: self.options.dry_run,
            fleet_complete: report.complete,
            servers_considered: considered,
            servers_processed: selected.len(),
            changed: Vec::new(),
            total_changes: 0,
        };

        for (i, record) in selected.iter().enumerate() {
            info!(
                server = %record.display_name,
                owner = %record.owner,
                position = i + 1,
                total = selected.len(),
                "reconciling server"
            );
            let outcome = self.reconcile_server(record);

            // recorded once per server per run, changes or not
            if !self.options.dry_run {
                if let Err(err) = self.run_log.record(&record.id, &record.display_name) {
                    warn!(server = %record.id, error = %err, "run-log append failed");
                }
            }

            summary.total_changes += outcome.changes.len();
            if !outcome.changes.is_empty() {
                summary.changed.push(outcome);
            }
        }

        summary
    }

    /// Apply the execution mode to the fetched fleet.
    ///
    /// In new-only mode a server is skipped only when it is logged as
    /// processed *and* old enough: servers created within the freshness
    /// window are always included, even if a log entry exists.
    pub fn select_servers(
        &self,
        fleet: Vec<ServiceRecord>,
        now: OffsetDateTime,
    ) -> Vec<ServiceRecord> {
        if !self.options.new_only {
            return fleet;
        }

        fleet
            .into_iter()
            .filter(|record| {
                let fresh = record.created_within(self.freshness_window, now);
                let keep = fresh || !self.run_log.is_processed(&record.id);
                if !keep {
                    info!(server = %record.display_name, "already reconciled, skipping");
                }
                keep
            })
            .collect()
    }

    /// One server, start to finish. Never propagates an error: a server
    /// that cannot be reached or read simply reports zero changes.
    fn reconcile_server(&self, record: &ServiceRecord) -> ServerOutcome {
        let mut outcome = ServerOutcome {
            id: record.id.clone(),
            name: record.display_name.clone(),
            owner: record.owner.clone(),
            changes: Vec::new(),
        };

        let Some(backend) = self.connect(record) else {
            warn!(server = %record.display_name, "no working connection, skipping server");
            return outcome;
        };

        let exempt = self.policy.is_exempt_tier(&record.classifier);
        let targets = match backend.discover(exempt) {
            Ok(targets) => targets,
            Err(err) => {
                warn!(server = %record.display_name, error = %err, "resource discovery failed");
                return outcome;
            }
        };

        for target in &targets {
            if self.policy.is_excluded(&target.name) {
                info!(resource = %target.name, "excluded by name marker, skipping");
                continue;
            }

            match self.reconcile_target(backend.as_ref(), target, exempt) {
                Ok(applied) => outcome.changes.extend(applied),
                Err(err) => {
                    warn!(
                        server = %record.display_name,
                        resource = %target.name,
                        error = %err,
                        "reconciliation pass failed"
                    );
                }
            }
        }

        outcome
    }

    /// One read → diff → write pass over one resource. Returns the
    /// descriptions of changes that actually reached the server.
    fn reconcile_target(
        &self,
        backend: &dyn MediaBackend,
        target: &Target,
        exempt_tier: bool,
    ) -> Result<Vec<String>, refrain_backend::BackendError> {
        let document = backend.read(&target.resource)?;
        let rules = self.policy.rules_for(target.kind);
        let pass = reconcile(&document, rules, &RuleContext { exempt_tier });

        if self.options.dry_run {
            return Ok(describe_changes(target, &pass.changes));
        }

        if !pass.needs_write(rules) {
            return Ok(Vec::new());
        }

        let report = backend.write(&target.resource, &pass.document, &pass.changes)?;
        match &report {
            WriteReport::Document(outcome) if !outcome.is_applied() => {
                warn!(resource = %target.name, outcome = ?outcome, "document write refused");
                Ok(Vec::new())
            }
            WriteReport::Document(_) => {
                if pass.changes.is_empty() {
                    info!(resource = %target.name, "verified, no changes needed");
                }
                Ok(describe_changes(target, &pass.changes))
            }
            WriteReport::Fields(fields) => {
                // per-field writes can partially succeed; report what landed
                let applied: Vec<String> = pass
                    .changes
                    .iter()
                    .zip(fields)
                    .filter(|(_, f)| f.outcome.is_applied())
                    .map(|(c, _)| format!("{}: {}", target.name, c.describe()))
                    .collect();
                Ok(applied)
            }
        }
    }

    /// Resolve a working connection + adapter for a server, or `None` when
    /// the server has to be skipped.
    fn connect(&self, record: &ServiceRecord) -> Option<Box<dyn MediaBackend>> {
        match record.family {
            Family::Emby => self.connect_emby(record),
            Family::Plex => self.connect_plex(record),
        }
    }

    /// Directory credential first; on probe failure, one fresh-credential
    /// retry before giving up.
    fn connect_emby(&self, record: &ServiceRecord) -> Option<Box<dyn MediaBackend>> {
        let mut conn = CachedConnection {
            host: record.host.clone()?,
            port: record.port?,
            token: record.credential.clone()?,
        };

        let backend = (self.backend_factory)(record, &conn);
        if backend.probe() {
            return Some(backend);
        }

        warn!(server = %record.display_name, "stored credential failed, requesting a fresh one");
        conn.token =
            fresh_credential(self.directory, &record.id, Some(&conn.token), self.fresh_delay)?;

        let backend = (self.backend_factory)(record, &conn);
        if backend.probe() {
            Some(backend)
        } else {
            None
        }
    }

    /// Cached connection first; fall back to directory data and cache what
    /// we end up using. The fallback is not probed -- a dead connection
    /// surfaces on the first read, exactly like any mid-run failure.
    fn connect_plex(&self, record: &ServiceRecord) -> Option<Box<dyn MediaBackend>> {
        if let Some(cached) = self.token_cache.lookup(&record.id) {
            let backend = (self.backend_factory)(record, &cached);
            if backend.probe() {
                info!(server = %record.display_name, "using cached connection");
                return Some(backend);
            }
            warn!(server = %record.display_name, "cached connection failed, using directory data");
        }

        let conn = CachedConnection {
            host: record.host.clone()?,
            port: record.port?,
            token: record.credential.clone()?,
        };

        if !self.options.dry_run {
            if let Err(err) = self.token_cache.store(&record.id, &conn) {
                warn!(server = %record.id, error = %err, "token-cache append failed");
            }
        }

        Some((self.backend_factory)(record, &conn))
    }
}

fn describe_changes(target: &Target, changes: &[refrain_core::ChangeRecord]) -> Vec<String> {
    changes
        .iter()
        .map(|c| format!("{}: {}", target.name, c.describe()))
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
