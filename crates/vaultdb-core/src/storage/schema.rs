//! Versioned schema for the plaintext database.
//!
//! The version lives in `PRAGMA user_version`. Each migration runs in its own
//! transaction together with the version bump, so a store is never left half
//! migrated.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, VaultError};

const MIGRATIONS: &[&str] = &[
    // v1: profile table
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        age INTEGER,
        employment_status TEXT,
        housing_situation TEXT,
        financial_confidence_score INTEGER,
        email TEXT,
        location TEXT,
        monthly_income TEXT,
        monthly_expenses TEXT,
        total_debt TEXT,
        credit_score TEXT,
        bank_account_balance TEXT,
        financial_goal TEXT,
        created_at TEXT NOT NULL
    );
    "#,
    // v2: update stamps, login credentials, name lookups
    r#"
    ALTER TABLE users ADD COLUMN updated_at TEXT;
    ALTER TABLE users ADD COLUMN password_hash TEXT;
    CREATE INDEX IF NOT EXISTS users_name ON users (name);
    "#,
];

/// Schema version this build writes.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

pub fn current_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Bring the schema up to [`SCHEMA_VERSION`]. Idempotent.
///
/// # Errors
///
/// `VaultError::Storage` if the store was written by a newer schema.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(VaultError::Storage(format!(
            "Store schema v{} is newer than supported v{}",
            current, SCHEMA_VERSION
        )));
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as i64 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!(version, "applied schema migration");
    }
    Ok(())
}
