//! Promotion of shadow creation times after a restricted migration.

use tracing::{info, warn};

use super::{schema::SHADOW_COLUMN, validate_identifier, RecordStore};
use crate::error::Result;

/// Copy the shadow creation time into `created` and `updated`.
///
/// Only rows with a non-empty shadow value are touched. Without a shadow
/// column (never added, or already dropped) this is a no-op returning 0.
///
/// # Errors
///
/// Returns an error if the table name is invalid or the update fails.
pub fn apply_fixup(store: &RecordStore, table: &str) -> Result<usize> {
    validate_identifier(table)?;
    if !store.has_column(table, SHADOW_COLUMN)? {
        warn!("{} has no {} column, nothing to fix", table, SHADOW_COLUMN);
        return Ok(0);
    }

    let affected = store.connection().execute(
        &format!(
            "UPDATE {table} SET created = {SHADOW_COLUMN}, updated = {SHADOW_COLUMN} \
             WHERE {SHADOW_COLUMN} IS NOT NULL AND {SHADOW_COLUMN} != ''"
        ),
        [],
    )?;
    info!("Restored original timestamps on {} rows of {}", affected, table);
    Ok(affected)
}

/// Drop the shadow column once its values have been promoted.
///
/// Returns `false` if the column was already gone.
///
/// # Errors
///
/// Returns an error if the table name is invalid or the DDL fails.
pub fn drop_shadow_column(store: &RecordStore, table: &str) -> Result<bool> {
    validate_identifier(table)?;
    if !store.has_column(table, SHADOW_COLUMN)? {
        return Ok(false);
    }
    store
        .connection()
        .execute(&format!("ALTER TABLE {table} DROP COLUMN {SHADOW_COLUMN}"), [])?;
    info!("Dropped {} from {}", SHADOW_COLUMN, table);
    Ok(true)
}
