//! `SQLite` schema for telemetry record tables.
//!
//! Table names are supplied at runtime, so statements are built from
//! templates. Callers must validate the name with
//! [`super::validate_identifier`] first.

/// Shadow column carrying the legacy creation time until fixup.
pub const SHADOW_COLUMN: &str = "original_created";

/// Record columns, in the order used by inserts and selects.
pub const RECORD_COLUMNS: &[&str] = &[
    "id",
    "random_id",
    "type",
    "ct_type",
    "nsapp",
    "method",
    "os_type",
    "os_version",
    "pve_version",
    "disk_size",
    "core_count",
    "ram_size",
    "status",
    "error",
    "exit_code",
    "repo_source",
    "created",
    "updated",
];

/// SQL statement creating a record table.
#[must_use]
pub fn create_table(table: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY NOT NULL,
    random_id TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL DEFAULT 'lxc',
    ct_type INTEGER NOT NULL DEFAULT 0,
    nsapp TEXT NOT NULL DEFAULT '',
    method TEXT,
    os_type TEXT,
    os_version TEXT,
    pve_version TEXT,
    disk_size INTEGER,
    core_count INTEGER,
    ram_size INTEGER,
    status TEXT NOT NULL DEFAULT 'installing',
    error TEXT NOT NULL DEFAULT '',
    exit_code INTEGER NOT NULL DEFAULT 0,
    repo_source TEXT,
    {SHADOW_COLUMN} TEXT,
    created TEXT NOT NULL DEFAULT '',
    updated TEXT NOT NULL DEFAULT ''
)
"
    )
}

/// SQL statement enforcing one record per session token.
#[must_use]
pub fn create_random_id_index(table: &str) -> String {
    format!("CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_random_id ON {table}(random_id)")
}

/// All statements needed to prepare a record table, in order.
#[must_use]
pub fn table_statements(table: &str) -> Vec<String> {
    vec![create_table(table), create_random_id_index(table)]
}
