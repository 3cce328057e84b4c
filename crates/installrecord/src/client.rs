//! Runtime reporting of installation outcomes.
//!
//! An installer creates one record when it starts and finalizes it once when
//! it ends. Telemetry must never influence the installation: every call
//! returns a [`ReportOutcome`] instead of an error, and the outcome is logged
//! at debug level.
//!
//! The at-most-once guarantee of [`TelemetryClient::finalize`] lives in the
//! caller-owned [`InstallSession`]; there is no process-wide flag. Sessions
//! are not shared between threads.

use std::fmt;

use tracing::debug;

use crate::backend::{BackendError, HttpBackend, RecordBackend};
use crate::config::{Config, TelemetryConfig};
use crate::record::{Status, StatusUpdate, TelemetryRecord};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing reported yet.
    #[default]
    Uninitialized,
    /// The record was created; its identifier is cached.
    Created {
        /// Identifier assigned by the record store.
        record_id: String,
    },
    /// Finalization ran. No further network activity happens.
    Finalized,
}

/// One installation session and its reporting state.
#[derive(Debug, Clone)]
pub struct InstallSession {
    record: TelemetryRecord,
    state: SessionState,
}

impl InstallSession {
    /// Start a session from the record describing it.
    #[must_use]
    pub fn new(record: TelemetryRecord) -> Self {
        Self {
            record,
            state: SessionState::Uninitialized,
        }
    }

    /// Session token.
    #[must_use]
    pub fn random_id(&self) -> &str {
        &self.record.random_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Record describing this session.
    #[must_use]
    pub fn record(&self) -> &TelemetryRecord {
        &self.record
    }
}

/// Why a call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No HTTP client is available.
    NoHttp,
    /// Diagnostics were not opted into.
    NotOptedIn,
    /// The session has no token.
    NoSessionToken,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHttp => write!(f, "no HTTP client available"),
            Self::NotOptedIn => write!(f, "diagnostics not enabled"),
            Self::NoSessionToken => write!(f, "session token is empty"),
        }
    }
}

/// Result of a reporting call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// A prerequisite was missing.
    Skipped(SkipReason),
    /// The session already passed this step.
    AlreadyReported,
    /// The record was created.
    Created {
        /// Identifier assigned by the record store.
        record_id: String,
    },
    /// The record was finalized.
    Updated {
        /// Identifier of the finalized record.
        record_id: String,
    },
    /// No record exists for the session; nothing to finalize.
    NothingToUpdate,
    /// The request failed.
    Failed(BackendError),
}

impl ReportOutcome {
    /// Whether the call completed without a request failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Created { .. } | Self::Updated { .. } | Self::NothingToUpdate
        )
    }
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::AlreadyReported => write!(f, "already reported"),
            Self::Created { record_id } => write!(f, "created {record_id}"),
            Self::Updated { record_id } => write!(f, "updated {record_id}"),
            Self::NothingToUpdate => write!(f, "no record to update"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Reports installation sessions to the record store.
#[derive(Debug)]
pub struct TelemetryClient<B> {
    diagnostics: bool,
    backend: Option<B>,
}

impl TelemetryClient<HttpBackend> {
    /// Build a client talking HTTP to the configured record store.
    ///
    /// A missing URL or a client that cannot be built leaves the client
    /// without HTTP; every call then reports [`SkipReason::NoHttp`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let backend = match config.require_backend() {
            Ok(url) => HttpBackend::new(url, &config.backend.collection, config.timeout())
                .map_err(|e| debug!("Telemetry HTTP client unavailable: {e}"))
                .ok(),
            Err(_) => None,
        };
        Self::new(&config.telemetry, backend)
    }
}

impl<B: RecordBackend> TelemetryClient<B> {
    /// Create a client over an optional backend.
    #[must_use]
    pub fn new(config: &TelemetryConfig, backend: Option<B>) -> Self {
        Self {
            diagnostics: config.diagnostics,
            backend,
        }
    }

    /// The backend in use, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    fn ready(&self, session: &InstallSession) -> Result<&B, SkipReason> {
        let backend = self.backend.as_ref().ok_or(SkipReason::NoHttp)?;
        if !self.diagnostics {
            return Err(SkipReason::NotOptedIn);
        }
        if session.random_id().trim().is_empty() {
            return Err(SkipReason::NoSessionToken);
        }
        Ok(backend)
    }

    /// Create the `installing` record for a session.
    ///
    /// On success the record identifier is cached in the session.
    pub fn create(&self, session: &mut InstallSession) -> ReportOutcome {
        let outcome = self.try_create(session);
        debug!(
            random_id = session.random_id(),
            "Telemetry create: {}", outcome
        );
        outcome
    }

    fn try_create(&self, session: &mut InstallSession) -> ReportOutcome {
        let backend = match self.ready(session) {
            Ok(backend) => backend,
            Err(reason) => return ReportOutcome::Skipped(reason),
        };
        if session.state != SessionState::Uninitialized {
            return ReportOutcome::AlreadyReported;
        }

        let mut record = session.record.clone();
        record.id = None;
        record.status = Status::Installing;
        record.error.clear();
        record.exit_code = 0;
        record.created = None;
        record.updated = None;
        record.original_created = None;

        match backend.create(&record) {
            Ok(record_id) => {
                session.state = SessionState::Created {
                    record_id: record_id.clone(),
                };
                ReportOutcome::Created { record_id }
            }
            Err(err) => ReportOutcome::Failed(err),
        }
    }

    /// Move the session's record to its terminal status.
    ///
    /// Runs at most one update per session. Once this has been attempted,
    /// whatever the result, later calls return
    /// [`ReportOutcome::AlreadyReported`] without touching the network.
    pub fn finalize(&self, session: &mut InstallSession, status: &str, code: i32) -> ReportOutcome {
        let outcome = self.try_finalize(session, status, code);
        debug!(
            random_id = session.random_id(),
            status, code, "Telemetry finalize: {}", outcome
        );
        outcome
    }

    fn try_finalize(&self, session: &mut InstallSession, status: &str, code: i32) -> ReportOutcome {
        let backend = match self.ready(session) {
            Ok(backend) => backend,
            Err(reason) => return ReportOutcome::Skipped(reason),
        };

        let cached = match &session.state {
            SessionState::Finalized => return ReportOutcome::AlreadyReported,
            SessionState::Created { record_id } => Some(record_id.clone()),
            SessionState::Uninitialized => None,
        };

        let record_id = match cached {
            Some(record_id) => record_id,
            None => match backend.find_by_random_id(session.random_id()) {
                Ok(Some(record_id)) => record_id,
                Ok(None) => {
                    session.state = SessionState::Finalized;
                    return ReportOutcome::NothingToUpdate;
                }
                Err(err) => {
                    session.state = SessionState::Finalized;
                    return ReportOutcome::Failed(err);
                }
            },
        };

        let update = StatusUpdate::from_report(status, code);
        let result = backend.update(&record_id, &update);
        session.state = SessionState::Finalized;

        match result {
            Ok(()) => ReportOutcome::Updated { record_id },
            Err(err) => ReportOutcome::Failed(err),
        }
    }
}
