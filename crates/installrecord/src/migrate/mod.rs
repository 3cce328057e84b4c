//! Legacy to record store migration.
//!
//! A run authenticates against the target, probes access, then walks the
//! legacy source page by page. Individual record and page failures are
//! counted and skipped; only setup failures abort the run. Reruns are safe
//! because the target rejects duplicate session tokens, which are counted
//! as skipped.

use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, RecordBackend};
use crate::config::{Credentials, MigrationConfig};
use crate::error::{Error, Result};
use crate::legacy::{self, LegacySource};
use crate::timestamp;

/// How the orchestrator is authenticated against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// May write `created`/`updated` directly.
    Privileged,
    /// Timestamps travel in the shadow `original_created` field.
    Restricted,
    /// No credentials configured.
    Anonymous,
}

impl AuthMode {
    /// Whether records keep their legacy timestamps in `created`/`updated`.
    #[must_use]
    pub fn writes_timestamps(self) -> bool {
        matches!(self, Self::Privileged)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Privileged => write!(f, "privileged"),
            Self::Restricted => write!(f, "restricted"),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Records created on the target.
    pub migrated: u64,
    /// Records already present on the target.
    pub skipped: u64,
    /// Records that could not be fetched or created.
    pub failed: u64,
    /// Records outside the requested date range.
    pub filtered: u64,
}

impl Summary {
    /// Total records accounted for.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.migrated + self.skipped + self.failed + self.filtered
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migrated: {}, skipped: {}, failed: {}",
            self.migrated, self.skipped, self.failed
        )?;
        if self.filtered > 0 {
            write!(f, ", filtered: {}", self.filtered)?;
        }
        Ok(())
    }
}

/// Options controlling one migration run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Records per page.
    pub batch_size: u32,
    /// First page to fetch (1-based).
    pub start_page: u32,
    /// Pause between pages.
    pub page_delay: Duration,
    /// Skip records created before this time.
    pub since: Option<DateTime<Utc>>,
    /// Skip records created after this time.
    pub until: Option<DateTime<Utc>>,
    /// Label stored on every migrated record.
    pub repo_source: Option<String>,
    /// Privileged auth collection and credentials.
    pub privileged: Option<(String, Credentials)>,
    /// Restricted auth collection and credentials.
    pub restricted: Option<(String, Credentials)>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::from_config(&MigrationConfig::default())
    }
}

impl MigrationOptions {
    /// Build options from a validated configuration section.
    #[must_use]
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            start_page: config.start_page.max(1),
            page_delay: Duration::from_millis(config.page_delay_ms),
            since: config.since.as_deref().and_then(timestamp::parse),
            until: config.until.as_deref().and_then(timestamp::parse),
            repo_source: config.repo_source.clone(),
            privileged: config
                .privileged
                .clone()
                .map(|creds| (config.privileged_collection.clone(), creds)),
            restricted: config
                .restricted
                .clone()
                .map(|creds| (config.restricted_collection.clone(), creds)),
        }
    }

    fn in_range(&self, created: Option<DateTime<Utc>>) -> bool {
        let Some(created) = created else {
            return true;
        };
        self.since.is_none_or(|since| created >= since)
            && self.until.is_none_or(|until| created <= until)
    }
}

/// Number of records on a 1-based page.
#[must_use]
pub fn page_len(total: u64, batch_size: u32, page: u32) -> u64 {
    let batch = u64::from(batch_size);
    let offset = u64::from(page.saturating_sub(1)) * batch;
    total.saturating_sub(offset).min(batch)
}

/// Number of pages needed for `total` records.
#[must_use]
pub fn page_count(total: u64, batch_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(batch_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Moves legacy records into the record store.
#[derive(Debug)]
pub struct MigrationOrchestrator<S, B> {
    source: S,
    target: B,
    target_url: String,
    options: MigrationOptions,
}

impl<S: LegacySource, B: RecordBackend> MigrationOrchestrator<S, B> {
    /// Create an orchestrator. `target_url` is used in error messages.
    pub fn new(
        source: S,
        target: B,
        target_url: impl Into<String>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            target,
            target_url: target_url.into(),
            options,
        }
    }

    /// The target backend.
    #[must_use]
    pub fn target(&self) -> &B {
        &self.target
    }

    /// Consume the orchestrator, returning the target backend.
    #[must_use]
    pub fn into_target(self) -> B {
        self.target
    }

    /// The legacy source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Authenticate and probe the target.
    ///
    /// Privileged credentials are tried first, then restricted ones. With no
    /// credentials configured the run proceeds anonymously if the target
    /// allows it.
    ///
    /// # Errors
    ///
    /// Returns an error if every configured credential is rejected, or if
    /// the target is unreachable or refuses access.
    pub fn authenticate(&mut self) -> Result<AuthMode> {
        let candidates = [
            (AuthMode::Privileged, self.options.privileged.clone()),
            (AuthMode::Restricted, self.options.restricted.clone()),
        ];

        let mut mode = AuthMode::Anonymous;
        let mut last_failure = None;
        for (candidate, credentials) in candidates {
            let Some((collection, credentials)) = credentials else {
                continue;
            };
            match self.target.authenticate(&collection, &credentials) {
                Ok(()) => {
                    mode = candidate;
                    last_failure = None;
                    break;
                }
                Err(err) if err.is_transport() => {
                    return Err(Error::target_unavailable(&self.target_url, err.to_string()));
                }
                Err(err) => {
                    warn!(
                        "{} authentication as {} failed: {}",
                        candidate, credentials.identity, err
                    );
                    last_failure = Some(err);
                }
            }
        }

        if let Some(err) = last_failure {
            return Err(Error::authentication(&self.target_url, err.to_string()));
        }

        match self.target.probe() {
            Ok(()) => {}
            Err(err @ BackendError::Unauthorized { .. }) => {
                return Err(Error::authentication(&self.target_url, err.to_string()));
            }
            Err(err) => {
                return Err(Error::target_unavailable(&self.target_url, err.to_string()));
            }
        }

        info!("Authenticated against {} ({})", self.target_url, mode);
        Ok(mode)
    }

    /// Run a full migration.
    ///
    /// # Errors
    ///
    /// Returns an error only for setup failures: authentication, an
    /// unreachable target, or a source that cannot report its size.
    pub fn run(&mut self) -> Result<Summary> {
        let mode = self
            .authenticate()
            .inspect_err(|err| error!("Migration setup failed: {err}"))?;

        let total = self.source.total_entries().map_err(|err| Error::Source {
            source_url: self.source.base_url().to_string(),
            message: err.to_string(),
        })?;
        let batch_size = self.options.batch_size;
        let pages = page_count(total, batch_size);
        info!(
            "Migrating {} records in {} pages of {} (starting at page {})",
            total, pages, batch_size, self.options.start_page
        );

        let mut summary = Summary::default();
        for page in self.options.start_page..=pages {
            match self.source.fetch_page(page, batch_size) {
                Ok(records) => {
                    for raw in &records {
                        self.import_one(raw, mode, &mut summary);
                    }
                }
                Err(err) => {
                    let lost = page_len(total, batch_size, page);
                    warn!(
                        "Page {} could not be fetched, counting {} records as failed: {}",
                        page, lost, err
                    );
                    summary.failed += lost;
                }
            }

            info!("Page {}/{} done ({})", page, pages, summary);
            if page < pages && !self.options.page_delay.is_zero() {
                thread::sleep(self.options.page_delay);
            }
        }

        info!("Migration finished: {}", summary);
        Ok(summary)
    }

    fn import_one(&self, raw: &Value, mode: AuthMode, summary: &mut Summary) {
        if !self.options.in_range(legacy::created_time(raw)) {
            summary.filtered += 1;
            return;
        }

        let Some(mut record) = legacy::convert(raw) else {
            summary.failed += 1;
            return;
        };
        if mode.writes_timestamps() {
            record.updated.clone_from(&record.created);
        } else {
            record.original_created = record.created.take();
        }
        record.repo_source.clone_from(&self.options.repo_source);

        match self.target.create(&record) {
            Ok(id) => {
                debug!("Migrated {} as {}", record.random_id, id);
                summary.migrated += 1;
            }
            Err(err) if err.is_conflict() => {
                debug!("Skipping {}, already present", record.random_id);
                summary.skipped += 1;
            }
            Err(err) => {
                warn!("Failed to migrate {}: {}", record.random_id, err);
                summary.failed += 1;
            }
        }
    }
}
