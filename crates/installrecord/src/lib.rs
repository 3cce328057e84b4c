//! `installrecord` - Installation outcome telemetry and record migration
//!
//! This library reports the lifecycle of installation sessions to a record
//! store, migrates legacy records into that store over HTTP or straight into
//! its database, and repairs timestamps after a restricted migration.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod exit_code;
pub mod legacy;
pub mod logging;
pub mod migrate;
pub mod record;
pub mod storage;
pub mod timestamp;

pub use backend::{BackendError, RecordBackend};
pub use client::{InstallSession, ReportOutcome, SessionState, TelemetryClient};
pub use config::Config;
pub use error::{Error, Result};
pub use exit_code::explain;
pub use logging::init_logging;
pub use migrate::{MigrationOrchestrator, Summary};
pub use record::{RecordType, Status, StatusUpdate, TelemetryRecord};
pub use storage::RecordStore;
