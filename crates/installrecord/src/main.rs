//! `instrec` - CLI for installrecord
//!
//! Reports installation sessions, migrates legacy records and runs the
//! offline database tools.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, error};

use installrecord::backend::HttpBackend;
use installrecord::cli::{
    Cli, Command, ConfigCommand, FixupArgs, ImportArgs, MigrateArgs, ReportCommand,
};
use installrecord::client::{InstallSession, TelemetryClient};
use installrecord::exit_code;
use installrecord::legacy::HttpLegacySource;
use installrecord::migrate::{MigrationOptions, MigrationOrchestrator};
use installrecord::storage::{apply_fixup, drop_shadow_column, BatchSqlImporter, RecordStore};
use installrecord::{init_logging, Config, TelemetryRecord};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Report(cmd) => {
            handle_report(cli.config, cmd);
            Ok(())
        }
        Command::Explain(args) => {
            handle_explain(args.code);
            Ok(())
        }
        Command::Migrate(args) => handle_migrate(load_config(cli.config)?, &args),
        Command::Import(args) => handle_import(load_config(cli.config)?, &args),
        Command::Fixup(args) => handle_fixup(load_config(cli.config)?, &args),
        Command::Config(cmd) => handle_config(cli.config, cmd),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    Config::load_from(path).context("failed to load configuration")
}

/// Runtime reporting never fails the calling installer.
fn handle_report(config_path: Option<PathBuf>, cmd: ReportCommand) {
    let mut config = Config::load_from(config_path).unwrap_or_else(|err| {
        debug!("Telemetry falls back to defaults: {err}");
        Config::default()
    });

    match cmd {
        ReportCommand::Start(args) => {
            config.telemetry.diagnostics |= args.diagnostics;
            let client = TelemetryClient::from_config(&config);
            let mut session = InstallSession::new(args.to_record());
            client.create(&mut session);
        }
        ReportCommand::Finish(args) => {
            config.telemetry.diagnostics |= args.diagnostics;
            let client = TelemetryClient::from_config(&config);
            let mut session = InstallSession::new(TelemetryRecord::installing(args.random_id, ""));
            client.finalize(&mut session, &args.status, args.exit_code);
        }
    }
}

fn handle_explain(code: i32) {
    let text = exit_code::explain(code);
    match exit_code::classify(code) {
        Some(class) => println!("{code} ({class}): {text}"),
        None => println!("{code}: {text}"),
    }
    let detail = exit_code::describe(code);
    if detail != text {
        println!("  {detail}");
    }
}

fn handle_migrate(mut config: Config, args: &MigrateArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let target_url = config.require_backend()?.to_string();
    let source_url = config.require_source()?.to_string();
    let source = HttpLegacySource::new(source_url, config.timeout())?;
    let target = HttpBackend::new(&target_url, &config.backend.collection, config.timeout())?;

    let options = MigrationOptions::from_config(&config.migration);
    let mut orchestrator = MigrationOrchestrator::new(source, target, target_url, options);
    let summary = orchestrator.run().context("migration aborted")?;

    println!("{summary}");
    Ok(())
}

fn handle_import(mut config: Config, args: &ImportArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let importer = BatchSqlImporter::new(&config.import.table, config.import.repo_source.clone())?;

    if let Some(out) = &args.emit_sql {
        let count = importer
            .write_script(&args.file, out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Wrote {count} statements to {}", out.display());
        return Ok(());
    }

    let store = RecordStore::open(config.database_path())?;
    let report = importer
        .import_file(&store, &args.file)
        .with_context(|| format!("failed to import {}", args.file.display()))?;
    println!(
        "Imported {} of {} records into {} ({} without session token)",
        report.inserted,
        report.records,
        importer.table(),
        report.dropped
    );
    Ok(())
}

fn handle_fixup(mut config: Config, args: &FixupArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let path = config.database_path();
    if !path.exists() {
        bail!("database {} does not exist", path.display());
    }
    let store = RecordStore::open(&path)?;
    let table = &config.import.table;

    let affected = apply_fixup(&store, table)?;
    println!("Restored original timestamps on {affected} rows of {table}");

    if args.drop_shadow && drop_shadow_column(&store, table)? {
        println!("Dropped shadow column from {table}");
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = load_config(config_path)?;
            let shown = config.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Backend]");
                println!("  URL:                {}", shown.backend.url);
                println!("  Collection:         {}", shown.backend.collection);
                println!("  Timeout (secs):     {}", shown.backend.timeout_secs);
                println!();
                println!("[Telemetry]");
                println!("  Diagnostics:        {}", shown.telemetry.diagnostics);
                println!();
                println!("[Migration]");
                println!("  Source URL:         {}", shown.migration.source_url);
                println!("  Batch size:         {}", shown.migration.batch_size);
                println!("  Start page:         {}", shown.migration.start_page);
                println!("  Page delay (ms):    {}", shown.migration.page_delay_ms);
                println!(
                    "  Privileged login:   {}",
                    shown.migration.privileged.is_some()
                );
                println!(
                    "  Restricted login:   {}",
                    shown.migration.restricted.is_some()
                );
                println!();
                println!("[Import]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Table:              {}", shown.import.table);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
