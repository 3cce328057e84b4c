//! Record store access.
//!
//! The record store is a REST service holding [`TelemetryRecord`]s in a
//! collection. [`RecordBackend`] abstracts the calls the runtime client and
//! the migration tool make so both can be exercised without a network.
//!
//! ```text
//! RecordBackend (trait)
//!     |
//!     +-- HttpBackend    (reqwest, blocking, short timeouts)
//!     |
//!     +-- MemoryBackend  (in-process store for tests and dry runs)
//! ```

pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::config::Credentials;
use crate::record::{StatusUpdate, TelemetryRecord};

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Validation code the record store uses for a uniqueness violation.
pub const NOT_UNIQUE_CODE: &str = "validation_not_unique";

/// Outcome of a single record store request that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A record with the same unique field already exists.
    #[error("a record with the same {field} already exists")]
    Conflict {
        /// Name of the conflicting field.
        field: String,
    },

    /// The request was rejected for lack of (sufficient) credentials.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// Any other non-success response.
    #[error("unexpected HTTP status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never produced a response (timeout, DNS, refused).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether this is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the request failed before a response arrived.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Operations the record store supports.
pub trait RecordBackend {
    /// Exchange credentials against an auth collection for a bearer token
    /// that is attached to every later request.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the request fails.
    fn authenticate(
        &mut self,
        auth_collection: &str,
        credentials: &Credentials,
    ) -> Result<(), BackendError>;

    /// Check that the records endpoint is reachable and readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is unreachable or denies access.
    fn probe(&self) -> Result<(), BackendError>;

    /// Create a record and return its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Conflict`] when the `random_id` is taken, or
    /// another variant when the request fails.
    fn create(&self, record: &TelemetryRecord) -> Result<String, BackendError>;

    /// Apply a status update to an existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn update(&self, id: &str, update: &StatusUpdate) -> Result<(), BackendError>;

    /// Find the identifier of the record holding a session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn find_by_random_id(&self, random_id: &str) -> Result<Option<String>, BackendError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: BTreeMap<String, FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    code: String,
}

/// Map an HTTP status and body to a request outcome.
///
/// Conflicts are recognised from a 409 status or from the structured field
/// validation payload of a 400 response.
///
/// # Errors
///
/// Returns the [`BackendError`] matching a non-success response.
pub fn classify_response(status: u16, body: &str) -> Result<(), BackendError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();

    match status {
        401 | 403 => Err(BackendError::Unauthorized { status }),
        400 | 409 => {
            let conflict = parsed.as_ref().and_then(|parsed| {
                parsed
                    .data
                    .iter()
                    .find(|(_, err)| err.code == NOT_UNIQUE_CODE)
                    .map(|(field, _)| field.clone())
            });
            match conflict {
                Some(field) => Err(BackendError::Conflict { field }),
                None if status == 409 => Err(BackendError::Conflict {
                    field: "random_id".to_string(),
                }),
                None => Err(status_error(status, parsed, body)),
            }
        }
        _ => Err(status_error(status, parsed, body)),
    }
}

fn status_error(status: u16, parsed: Option<ErrorBody>, body: &str) -> BackendError {
    let message = parsed
        .map(|parsed| parsed.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    BackendError::Status { status, message }
}
