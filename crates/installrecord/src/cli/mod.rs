//! Command-line interface for installrecord.
//!
//! This module provides the CLI structure for the `instrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExplainArgs, FixupArgs, ImportArgs, MigrateArgs, ReportCommand,
    ReportFinishArgs, ReportStartArgs,
};

use crate::logging::Verbosity;

/// instrec - Installation outcome telemetry and record migration
///
/// Reports installation sessions to a record store, migrates legacy
/// records into it, and repairs timestamps after a migration.
#[derive(Debug, Parser)]
#[command(name = "instrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report an installation session (never fails)
    #[command(subcommand)]
    Report(ReportCommand),

    /// Migrate records from the legacy API to the record store
    Migrate(MigrateArgs),

    /// Bulk import a legacy JSON export into the database
    Import(ImportArgs),

    /// Promote shadow creation times after a restricted migration
    Fixup(FixupArgs),

    /// Describe an installer exit code
    Explain(ExplainArgs),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "instrec");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::try_parse_from(["instrec", "-q", "explain", "1"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Quiet);
        let cli = Cli::try_parse_from(["instrec", "-vv", "explain", "1"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Trace);
        let cli = Cli::try_parse_from(["instrec", "explain", "1"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_parse_report_start() {
        let cli = Cli::try_parse_from([
            "instrec", "report", "start", "--random-id", "abc", "--nsapp", "debian", "--type",
            "vm", "--disk-size", "8", "--diagnostics",
        ])
        .unwrap();
        let Command::Report(ReportCommand::Start(args)) = cli.command else {
            panic!("expected report start");
        };
        assert_eq!(args.random_id, "abc");
        assert_eq!(args.record_type, crate::record::RecordType::Vm);
        assert_eq!(args.disk_size, Some(8));
        assert!(args.diagnostics);
    }

    #[test]
    fn test_parse_report_finish() {
        let cli = Cli::try_parse_from([
            "instrec", "report", "finish", "--random-id", "abc", "--status", "failed",
            "--exit-code", "100",
        ])
        .unwrap();
        let Command::Report(ReportCommand::Finish(args)) = cli.command else {
            panic!("expected report finish");
        };
        assert_eq!(args.status, "failed");
        assert_eq!(args.exit_code, 100);
    }

    #[test]
    fn test_report_start_without_token_parses() {
        let cli = Cli::try_parse_from(["instrec", "report", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Report(ReportCommand::Start(ReportStartArgs { ref random_id, .. })) if random_id.is_empty()
        ));
    }

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from([
            "instrec", "migrate", "--source-url", "http://legacy", "--batch-size", "100",
            "--start-page", "3",
        ])
        .unwrap();
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.source_url.as_deref(), Some("http://legacy"));
        assert_eq!(args.batch_size, Some(100));
        assert_eq!(args.start_page, Some(3));
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "instrec", "import", "export.json", "--table", "records", "--emit-sql", "out.sql",
        ])
        .unwrap();
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.file, PathBuf::from("export.json"));
        assert_eq!(args.emit_sql, Some(PathBuf::from("out.sql")));
    }

    #[test]
    fn test_parse_fixup() {
        let cli = Cli::try_parse_from(["instrec", "fixup", "--drop-shadow"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Fixup(FixupArgs {
                drop_shadow: true,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_explain_negative() {
        let cli = Cli::try_parse_from(["instrec", "explain", "-1"]).unwrap();
        let Command::Explain(args) = cli.command else {
            panic!("expected explain");
        };
        assert_eq!(args.code, -1);
    }

    #[test]
    fn test_parse_with_config() {
        let cli =
            Cli::try_parse_from(["instrec", "-c", "/custom/config.toml", "config", "path"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
