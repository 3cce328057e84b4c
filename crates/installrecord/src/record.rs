//! Telemetry record types.
//!
//! A [`TelemetryRecord`] describes one installation session. It is created
//! with status `installing` and moved to a terminal status at most once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::exit_code;

/// Kind of guest the installation targeted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// LXC container.
    #[default]
    Lxc,
    /// Virtual machine.
    Vm,
    /// Add-on installed into an existing guest.
    Addon,
    /// Host-level script.
    Pve,
}

impl RecordType {
    /// Wire name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lxc => "lxc",
            Self::Vm => "vm",
            Self::Addon => "addon",
            Self::Pve => "pve",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lxc" | "ct" => Ok(Self::Lxc),
            "vm" => Ok(Self::Vm),
            "addon" => Ok(Self::Addon),
            "pve" => Ok(Self::Pve),
            other => Err(format!("unknown record type: {other}")),
        }
    }
}

/// Lifecycle status of a record.
///
/// The success variant is spelled `sucess` on the wire; the record store
/// schema expects exactly that value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Installation started, no outcome yet.
    #[default]
    #[serde(rename = "installing")]
    Installing,
    /// Installation finished successfully.
    #[serde(rename = "sucess")]
    Success,
    /// Installation failed.
    #[serde(rename = "failed")]
    Failed,
    /// Installation ended in a state the caller could not name.
    #[serde(rename = "unknown")]
    Unknown,
}

impl Status {
    /// Wire name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Success => "sucess",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Map a status reported by an installer to a terminal status.
    ///
    /// `done`, `success` and `sucess` are success, `failed` is failure and
    /// everything else is unknown.
    #[must_use]
    pub fn from_report(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "done" | "success" | "sucess" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Map a status found in legacy data.
    ///
    /// Same as [`Status::from_report`], except that `installing` is kept.
    #[must_use]
    pub fn from_legacy(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("installing") {
            Self::Installing
        } else {
            Self::from_report(input)
        }
    }

    /// Whether this status ends the lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Installing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installation session as stored by the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Identifier assigned by the record store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Caller-generated session token, unique across records.
    pub random_id: String,
    /// Kind of guest.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Container/VM class code.
    pub ct_type: u8,
    /// Application slug.
    pub nsapp: String,
    /// Install method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Guest OS family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    /// Guest OS version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// Host platform version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pve_version: Option<String>,
    /// Disk size in GB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<u64>,
    /// CPU cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_count: Option<u64>,
    /// RAM in MB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_size: Option<u64>,
    /// Lifecycle status.
    pub status: Status,
    /// Error description, empty unless failed or unknown.
    #[serde(default)]
    pub error: String,
    /// Process exit code, 0 on success.
    #[serde(default)]
    pub exit_code: i32,
    /// Repository the record originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_source: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// Shadow copy of the legacy creation time, promoted after migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_created: Option<String>,
}

impl TelemetryRecord {
    /// Create a fresh `installing` record for a session.
    #[must_use]
    pub fn installing(random_id: impl Into<String>, nsapp: impl Into<String>) -> Self {
        Self {
            random_id: random_id.into(),
            nsapp: nsapp.into(),
            ..Self::default()
        }
    }
}

/// The partial update that finalizes a record.
///
/// Status, error text and exit code always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Terminal status.
    pub status: Status,
    /// Error description.
    pub error: String,
    /// Exit code.
    pub exit_code: i32,
}

impl StatusUpdate {
    /// Build the update for a reported status and exit code.
    ///
    /// Success forces exit code 0 and an empty error. Anything else keeps the
    /// exit code and describes it with [`exit_code::explain`].
    #[must_use]
    pub fn from_report(status: &str, code: i32) -> Self {
        match Status::from_report(status) {
            Status::Success => Self {
                status: Status::Success,
                error: String::new(),
                exit_code: 0,
            },
            other => Self {
                status: other,
                error: exit_code::explain(code).to_string(),
                exit_code: code,
            },
        }
    }
}
