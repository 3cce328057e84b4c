//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands. Flags that
//! mirror configuration values override the loaded [`Config`].

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::Config;
use crate::record::{RecordType, TelemetryRecord};

/// Runtime reporting commands. These always exit successfully.
#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Create the `installing` record for a session
    Start(ReportStartArgs),

    /// Record the final status of a session
    Finish(ReportFinishArgs),
}

/// Arguments for `report start`.
#[derive(Debug, Args)]
pub struct ReportStartArgs {
    /// Session token correlating start and finish
    #[arg(long, default_value = "")]
    pub random_id: String,

    /// Application slug
    #[arg(long, default_value = "")]
    pub nsapp: String,

    /// Guest kind (lxc, vm, addon, pve)
    #[arg(long = "type", default_value = "lxc")]
    pub record_type: RecordType,

    /// Container/VM class code
    #[arg(long, default_value_t = 0)]
    pub ct_type: u8,

    /// Disk size in GB
    #[arg(long)]
    pub disk_size: Option<u64>,

    /// CPU cores
    #[arg(long)]
    pub core_count: Option<u64>,

    /// RAM in MB
    #[arg(long)]
    pub ram_size: Option<u64>,

    /// Guest OS family
    #[arg(long)]
    pub os_type: Option<String>,

    /// Guest OS version
    #[arg(long)]
    pub os_version: Option<String>,

    /// Host platform version
    #[arg(long)]
    pub pve_version: Option<String>,

    /// Install method
    #[arg(long)]
    pub method: Option<String>,

    /// Repository label
    #[arg(long)]
    pub repo_source: Option<String>,

    /// Opt into sending diagnostics for this call
    #[arg(long)]
    pub diagnostics: bool,
}

impl ReportStartArgs {
    /// Build the record announced by this session.
    #[must_use]
    pub fn to_record(&self) -> TelemetryRecord {
        TelemetryRecord {
            record_type: self.record_type,
            ct_type: self.ct_type,
            disk_size: self.disk_size,
            core_count: self.core_count,
            ram_size: self.ram_size,
            os_type: self.os_type.clone(),
            os_version: self.os_version.clone(),
            pve_version: self.pve_version.clone(),
            method: self.method.clone(),
            repo_source: self.repo_source.clone(),
            ..TelemetryRecord::installing(&self.random_id, &self.nsapp)
        }
    }
}

/// Arguments for `report finish`.
#[derive(Debug, Args)]
pub struct ReportFinishArgs {
    /// Session token correlating start and finish
    #[arg(long, default_value = "")]
    pub random_id: String,

    /// Outcome: done, success, failed, or anything else for unknown
    #[arg(long)]
    pub status: String,

    /// Exit code of the installation
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub exit_code: i32,

    /// Opt into sending diagnostics for this call
    #[arg(long)]
    pub diagnostics: bool,
}

/// Arguments for `migrate`.
#[derive(Debug, Default, Args)]
pub struct MigrateArgs {
    /// Legacy source API base URL
    #[arg(long)]
    pub source_url: Option<String>,

    /// Record store base URL
    #[arg(long)]
    pub target_url: Option<String>,

    /// Target collection
    #[arg(long)]
    pub collection: Option<String>,

    /// Records per page
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Page to resume from (1-based)
    #[arg(long)]
    pub start_page: Option<u32>,

    /// Skip records created before this date
    #[arg(long)]
    pub since: Option<String>,

    /// Skip records created after this date
    #[arg(long)]
    pub until: Option<String>,

    /// Label stored in `repo_source`
    #[arg(long)]
    pub repo_source: Option<String>,
}

impl MigrateArgs {
    /// Overlay these flags on a configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.source_url {
            config.migration.source_url.clone_from(url);
        }
        if let Some(url) = &self.target_url {
            config.backend.url.clone_from(url);
        }
        if let Some(collection) = &self.collection {
            config.backend.collection.clone_from(collection);
        }
        if let Some(batch_size) = self.batch_size {
            config.migration.batch_size = batch_size;
        }
        if let Some(start_page) = self.start_page {
            config.migration.start_page = start_page;
        }
        if self.since.is_some() {
            config.migration.since.clone_from(&self.since);
        }
        if self.until.is_some() {
            config.migration.until.clone_from(&self.until);
        }
        if self.repo_source.is_some() {
            config.migration.repo_source.clone_from(&self.repo_source);
        }
    }
}

/// Arguments for `import`.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Legacy JSON export (an array of records)
    pub file: PathBuf,

    /// Target table
    #[arg(long)]
    pub table: Option<String>,

    /// Label stored in `repo_source`
    #[arg(long)]
    pub repo_source: Option<String>,

    /// Database file of the record store
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Write the SQL script to this file instead of running it
    #[arg(long, value_name = "FILE")]
    pub emit_sql: Option<PathBuf>,
}

impl ImportArgs {
    /// Overlay these flags on a configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(table) = &self.table {
            config.import.table.clone_from(table);
        }
        if self.repo_source.is_some() {
            config.import.repo_source.clone_from(&self.repo_source);
        }
        if self.database.is_some() {
            config.import.database_path.clone_from(&self.database);
        }
    }
}

/// Arguments for `fixup`.
#[derive(Debug, Args)]
pub struct FixupArgs {
    /// Table to fix
    #[arg(long)]
    pub table: Option<String>,

    /// Database file of the record store
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Drop the shadow column afterwards
    #[arg(long)]
    pub drop_shadow: bool,
}

impl FixupArgs {
    /// Overlay these flags on a configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(table) = &self.table {
            config.import.table.clone_from(table);
        }
        if self.database.is_some() {
            config.import.database_path.clone_from(&self.database);
        }
    }
}

/// Arguments for `explain`.
#[derive(Debug, Args)]
pub struct ExplainArgs {
    /// Exit code to describe
    #[arg(allow_negative_numbers = true)]
    pub code: i32,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;

    #[test]
    fn test_migrate_args_override_config() {
        let mut config = Config::default();
        let args = MigrateArgs {
            source_url: Some("http://legacy".into()),
            target_url: Some("http://db".into()),
            batch_size: Some(100),
            start_page: Some(4),
            since: Some("2024-01-01".into()),
            ..MigrateArgs::default()
        };
        args.apply(&mut config);

        assert_eq!(config.migration.source_url, "http://legacy");
        assert_eq!(config.backend.url, "http://db");
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(config.migration.start_page, 4);
        assert_eq!(config.migration.since.as_deref(), Some("2024-01-01"));
        assert_eq!(config.backend.collection, crate::config::DEFAULT_COLLECTION);
        assert!(config.migration.until.is_none());
    }

    #[test]
    fn test_import_args_override_config() {
        let mut config = Config::default();
        let args = ImportArgs {
            file: PathBuf::from("export.json"),
            table: Some("records".into()),
            repo_source: None,
            database: Some(PathBuf::from("/tmp/data.db")),
            emit_sql: None,
        };
        args.apply(&mut config);
        assert_eq!(config.import.table, "records");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/data.db"));
    }

    #[test]
    fn test_start_args_to_record() {
        let args = ReportStartArgs {
            random_id: "abc".into(),
            nsapp: "debian".into(),
            record_type: RecordType::Vm,
            ct_type: 3,
            disk_size: Some(8),
            core_count: None,
            ram_size: None,
            os_type: Some("debian".into()),
            os_version: None,
            pve_version: None,
            method: None,
            repo_source: None,
            diagnostics: true,
        };
        let record = args.to_record();
        assert_eq!(record.random_id, "abc");
        assert_eq!(record.record_type, RecordType::Vm);
        assert_eq!(record.ct_type, 3, "runtime class code is passed through");
        assert_eq!(record.status, Status::Installing);
        assert_eq!(record.disk_size, Some(8));
    }
}
