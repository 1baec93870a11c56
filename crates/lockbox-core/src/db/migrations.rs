//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    tracing::debug!("Local cache schema at version {}", CURRENT_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", [])?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, []) {
            conn.execute("ROLLBACK", []).ok();
            return Err(e.into());
        }
    }
    if let Err(e) = conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version]) {
        conn.execute("ROLLBACK", []).ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", []) {
        conn.execute("ROLLBACK", []).ok();
        return Err(e.into());
    }

    tracing::info!("Migrated local cache to version {}", version);
    Ok(())
}

/// Migration to version 1: lock box table keyed by owner and name
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    apply(
        conn,
        1,
        &[
            // Payload columns hold ciphertext tokens
            "CREATE TABLE IF NOT EXISTS lockboxes (
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                remote_id INTEGER NOT NULL DEFAULT 0,
                url TEXT NOT NULL DEFAULT '',
                login TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                synced_at INTEGER,
                deleted_at INTEGER,
                PRIMARY KEY (owner, name)
            )",
            "CREATE INDEX IF NOT EXISTS idx_lockboxes_deleted ON lockboxes(deleted_at)",
        ],
    )
}

/// Migration to version 2: pending-sync lookups
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &["CREATE INDEX IF NOT EXISTS idx_lockboxes_owner_synced ON lockboxes(owner, synced_at)"],
    )
}
