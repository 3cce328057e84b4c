//! Storage layer for installrecord.
//!
//! This module gives direct `SQLite` access to the record store's database
//! for the offline paths: bulk import of legacy exports and the timestamp
//! fixup that follows a restricted migration.

pub mod fixup;
pub mod import;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{RecordType, Status, TelemetryRecord};

pub use fixup::{apply_fixup, drop_shadow_column};
pub use import::{BatchSqlImporter, ImportReport};

fn identifier_re() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex")
    })
}

/// Check that a table or column name can be embedded in SQL verbatim.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for anything other than ASCII
/// letters, digits and underscores not starting with a digit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if identifier_re().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Direct handle on a record store database.
#[derive(Debug)]
pub struct RecordStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl RecordStore {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create a record table and its unique `random_id` index if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the DDL fails.
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        for statement in schema::table_statements(table) {
            self.conn.execute(&statement, [])?;
        }
        Ok(())
    }

    /// Check whether a table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Check whether a table has a column.
    ///
    /// Returns `false` for a missing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the query fails.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        validate_identifier(table)?;
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            if name? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Count records in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the query fails.
    pub fn count(&self, table: &str) -> Result<i64> {
        validate_identifier(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Get a record by session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the query fails.
    pub fn get_by_random_id(&self, table: &str, random_id: &str) -> Result<Option<TelemetryRecord>> {
        validate_identifier(table)?;
        let mut columns = schema::RECORD_COLUMNS.join(", ");
        let shadow = self.has_column(table, schema::SHADOW_COLUMN)?;
        if shadow {
            columns.push_str(", ");
            columns.push_str(schema::SHADOW_COLUMN);
        }

        let sql = format!("SELECT {columns} FROM {table} WHERE random_id = ?1");
        let record = self
            .conn
            .query_row(&sql, [random_id], |row| {
                let mut record = Self::row_to_record(row)?;
                if shadow {
                    record.original_created = row.get(schema::RECORD_COLUMNS.len())?;
                }
                Ok(record)
            })
            .optional()?;
        Ok(record)
    }

    /// Convert a database row to a record.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TelemetryRecord> {
        let record_type: String = row.get(2)?;
        let ct_type: i64 = row.get(3)?;
        let status: String = row.get(12)?;
        let size = |idx: usize| -> rusqlite::Result<Option<u64>> {
            Ok(row
                .get::<_, Option<i64>>(idx)?
                .and_then(|n| u64::try_from(n).ok()))
        };
        let timestamp = |idx: usize| -> rusqlite::Result<Option<String>> {
            Ok(row
                .get::<_, Option<String>>(idx)?
                .filter(|ts| !ts.is_empty()))
        };

        Ok(TelemetryRecord {
            id: row.get(0)?,
            random_id: row.get(1)?,
            record_type: record_type.parse().unwrap_or(RecordType::Lxc),
            ct_type: u8::from(ct_type >= 1),
            nsapp: row.get(4)?,
            method: row.get(5)?,
            os_type: row.get(6)?,
            os_version: row.get(7)?,
            pve_version: row.get(8)?,
            disk_size: size(9)?,
            core_count: size(10)?,
            ram_size: size(11)?,
            status: Status::from_legacy(&status),
            error: row.get(13)?,
            exit_code: row.get(14)?,
            repo_source: row.get(15)?,
            created: timestamp(16)?,
            updated: timestamp(17)?,
            original_created: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        store.ensure_table("records").unwrap();
        store
    }

    fn insert_row(store: &RecordStore, id: &str, random_id: &str) {
        store
            .connection()
            .execute(
                "INSERT INTO records (id, random_id, nsapp, status, created, updated)
                 VALUES (?1, ?2, 'debian', 'sucess', '2024-01-01 00:00:00.000Z', '2024-01-01 00:00:00.000Z')",
                [id, random_id],
            )
            .unwrap();
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("_dev_telemetry_data").is_ok());
        assert!(validate_identifier("Records2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2records").is_err());
        assert!(validate_identifier("records; DROP TABLE x").is_err());
        assert!(matches!(
            validate_identifier("a-b"),
            Err(Error::InvalidIdentifier(name)) if name == "a-b"
        ));
    }

    #[test]
    fn test_open_in_memory() {
        let store = RecordStore::open_in_memory().unwrap();
        assert_eq!(store.path(), Path::new(":memory:"));
        assert!(!store.has_table("records").unwrap());
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let store = create_test_store();
        store.ensure_table("records").unwrap();
        assert!(store.has_table("records").unwrap());
        assert!(store.has_column("records", "random_id").unwrap());
        assert!(store.has_column("records", schema::SHADOW_COLUMN).unwrap());
        assert!(!store.has_column("records", "nope").unwrap());
        assert_eq!(store.count("records").unwrap(), 0);
    }

    #[test]
    fn test_ensure_table_rejects_bad_name() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.ensure_table("x y").is_err());
    }

    #[test]
    fn test_random_id_is_unique() {
        let store = create_test_store();
        insert_row(&store, "a1", "r1");
        let duplicate = store.connection().execute(
            "INSERT INTO records (id, random_id) VALUES ('a2', 'r1')",
            [],
        );
        assert!(duplicate.is_err());
        assert_eq!(store.count("records").unwrap(), 1);
    }

    #[test]
    fn test_get_by_random_id() {
        let store = create_test_store();
        insert_row(&store, "a1", "r1");

        let record = store.get_by_random_id("records", "r1").unwrap().unwrap();
        assert_eq!(record.id.as_deref(), Some("a1"));
        assert_eq!(record.status, Status::Success);
        assert_eq!(record.record_type, RecordType::Lxc);
        assert_eq!(record.created.as_deref(), Some("2024-01-01 00:00:00.000Z"));
        assert!(record.original_created.is_none());

        assert!(store.get_by_random_id("records", "missing").unwrap().is_none());
    }

    #[test]
    fn test_has_column_on_missing_table() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(!store.has_column("ghost", "id").unwrap());
    }

    #[test]
    fn test_open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data.db");

        let store = RecordStore::open(&db_path).unwrap();
        store.ensure_table("records").unwrap();
        insert_row(&store, "a1", "r1");
        assert_eq!(store.path(), db_path);
        drop(store);

        let reopened = RecordStore::open(&db_path).unwrap();
        assert_eq!(reopened.count("records").unwrap(), 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper/data.db");
        let _store = RecordStore::open(&nested).unwrap();
        assert!(nested.exists());
    }
}
