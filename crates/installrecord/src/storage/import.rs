//! Bulk import of legacy JSON exports straight into the database.
//!
//! Every record becomes one `INSERT OR IGNORE` statement; the unique index
//! on `random_id` makes reruns on the same file insert nothing new. The
//! whole script runs in one transaction with relaxed durability.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

use super::{schema, validate_identifier, RecordStore};
use crate::error::{Error, Result};
use crate::legacy;
use crate::timestamp;

/// Length of generated record ids.
pub const ID_LENGTH: usize = 15;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Pragmas applied before the import transaction.
pub const IMPORT_PRAGMAS: &str = "PRAGMA journal_mode=WAL;\nPRAGMA synchronous=OFF;\n";

/// Generate a record id of [`ID_LENGTH`] lowercase alphanumerics.
#[must_use]
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| char::from(ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// Quote a string as an SQL literal.
///
/// NUL bytes are dropped: SQLite ends the statement text at the first one.
#[must_use]
pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\0', "").replace('\'', "''"))
}

fn sql_opt_string(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), sql_string)
}

fn sql_opt_int(value: Option<u64>) -> String {
    value.map_or_else(|| "NULL".to_string(), |n| n.to_string())
}

/// Read a legacy export: a JSON array of records.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or is not an
/// array.
pub fn read_export(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).map_err(|source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str(&content)? {
        Value::Array(records) => Ok(records),
        _ => Err(Error::MalformedExport(format!(
            "{} does not contain a JSON array",
            path.display()
        ))),
    }
}

/// Generated SQL for a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportScript {
    /// One `INSERT OR IGNORE` statement per line.
    pub statements: String,
    /// Records rendered into statements.
    pub records: usize,
    /// Records dropped for lacking a session token.
    pub dropped: usize,
}

impl ImportScript {
    /// Full script runnable by the `sqlite3` shell.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!("{IMPORT_PRAGMAS}BEGIN TRANSACTION;\n{}COMMIT;\n", self.statements)
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Records found in the export.
    pub records: usize,
    /// Rows actually inserted (existing session tokens are ignored).
    pub inserted: usize,
    /// Records dropped for lacking a session token.
    pub dropped: usize,
}

/// Renders legacy records into SQL and runs it against a table.
#[derive(Debug, Clone)]
pub struct BatchSqlImporter {
    table: String,
    repo_source: Option<String>,
}

impl BatchSqlImporter {
    /// Create an importer for `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is not a valid identifier.
    pub fn new(table: impl Into<String>, repo_source: Option<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table, repo_source })
    }

    /// Target table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Render one statement per record.
    ///
    /// Records without a readable creation time get the import time.
    #[must_use]
    pub fn render(&self, records: &[Value]) -> ImportScript {
        let imported_at = timestamp::now();
        let columns = schema::RECORD_COLUMNS.join(", ");
        let mut script = ImportScript::default();

        for raw in records {
            let Some(record) = legacy::convert(raw) else {
                script.dropped += 1;
                continue;
            };
            let created = record.created.unwrap_or_else(|| imported_at.clone());

            let _ = writeln!(
                script.statements,
                "INSERT OR IGNORE INTO {} ({}) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {});",
                self.table,
                columns,
                sql_string(&generate_id()),
                sql_string(&record.random_id),
                sql_string(record.record_type.as_str()),
                record.ct_type,
                sql_string(&record.nsapp),
                sql_opt_string(record.method.as_deref()),
                sql_opt_string(record.os_type.as_deref()),
                sql_opt_string(record.os_version.as_deref()),
                sql_opt_string(record.pve_version.as_deref()),
                sql_opt_int(record.disk_size),
                sql_opt_int(record.core_count),
                sql_opt_int(record.ram_size),
                sql_string(record.status.as_str()),
                sql_string(&record.error),
                record.exit_code,
                sql_opt_string(self.repo_source.as_deref()),
                sql_string(&created),
                sql_string(&created),
            );
            script.records += 1;
        }

        if script.dropped > 0 {
            warn!("{} records without a session token were dropped", script.dropped);
        }
        script
    }

    /// Import records into the store, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be prepared or the script fails;
    /// a failed script leaves the table unchanged.
    pub fn import_records(&self, store: &RecordStore, records: &[Value]) -> Result<ImportReport> {
        store.ensure_table(&self.table)?;
        let script = self.render(records);
        let before = store.count(&self.table)?;

        let conn = store.connection();
        conn.execute_batch(IMPORT_PRAGMAS)?;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&script.statements)?;
        tx.commit()?;

        let after = store.count(&self.table)?;
        let report = ImportReport {
            records: records.len(),
            inserted: usize::try_from(after - before).unwrap_or(0),
            dropped: script.dropped,
        };
        info!(
            "Imported {} of {} records into {}",
            report.inserted, report.records, self.table
        );
        Ok(report)
    }

    /// Import a legacy export file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the import fails.
    pub fn import_file(&self, store: &RecordStore, json_path: &Path) -> Result<ImportReport> {
        let records = read_export(json_path)?;
        self.import_records(store, &records)
    }

    /// Write the import script for an export file instead of running it.
    ///
    /// The script includes the table DDL so it can be applied to a fresh
    /// database. Returns the number of rendered records.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be read or the script cannot
    /// be written.
    pub fn write_script(&self, json_path: &Path, out_path: &Path) -> Result<usize> {
        let records = read_export(json_path)?;
        let script = self.render(&records);

        let mut sql = String::new();
        for statement in schema::table_statements(&self.table) {
            sql.push_str(statement.trim());
            sql.push_str(";\n");
        }
        sql.push_str(&script.to_sql());

        fs::write(out_path, sql)?;
        info!(
            "Wrote {} statements to {}",
            script.records,
            out_path.display()
        );
        Ok(script.records)
    }
}
