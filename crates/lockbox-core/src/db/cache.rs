//! Encrypted, owner-scoped local cache of lock boxes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tokio::sync::Mutex;

use crate::auth::Session;
use crate::crypto::Codec;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{LockBox, PayloadField};
use crate::util::{now_millis, retention_cutoff};

const SELECT_COLUMNS: &str = "remote_id, owner, name, url, login, password, description,
     created_at, updated_at, synced_at, deleted_at";

/// Thread-safe cache handle. Clones share one connection.
#[derive(Clone)]
pub struct LocalCache {
    db: Arc<Mutex<Database>>,
    codec: Codec,
}

impl LocalCache {
    pub fn new(db: Database, codec: Codec) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            codec,
        }
    }

    /// Open the cache at the given filesystem path.
    pub fn open_path(path: impl AsRef<Path>, codec: Codec) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, codec))
    }

    /// Open an in-memory cache (primarily for tests).
    pub fn open_in_memory(codec: Codec) -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, codec))
    }

    /// Insert a record for the session owner.
    ///
    /// A soft-deleted row with the same name is restored in place; an active
    /// one is an `AlreadyExists` error.
    pub async fn save(&self, session: &Session, record: &LockBox) -> Result<()> {
        let name = required_name(&record.name)?;
        let encrypted = self.codec.encrypt_fields(record)?;
        let db = self.db.lock().await;
        let conn = db.connection();

        let existing: Option<Option<i64>> = conn
            .query_row(
                "SELECT deleted_at FROM lockboxes WHERE owner = ? AND name = ?",
                params![session.owner(), name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(None) => Err(Error::AlreadyExists(name.to_string())),
            Some(Some(_)) => {
                conn.execute(
                    "UPDATE lockboxes
                     SET remote_id = CASE WHEN ?3 != 0 THEN ?3 ELSE remote_id END,
                         url = ?4, login = ?5, password = ?6, description = ?7,
                         updated_at = MAX(updated_at, ?8),
                         synced_at = ?9,
                         deleted_at = NULL
                     WHERE owner = ?1 AND name = ?2",
                    params![
                        session.owner(),
                        name,
                        encrypted.id,
                        encrypted.url,
                        encrypted.login,
                        encrypted.password,
                        encrypted.description,
                        encrypted.updated_at,
                        encrypted.synced_at,
                    ],
                )?;
                tracing::debug!(name, "Restored soft-deleted lock box in local cache");
                Ok(())
            }
            None => {
                conn.execute(
                    "INSERT INTO lockboxes
                     (owner, name, remote_id, url, login, password, description,
                      created_at, updated_at, synced_at, deleted_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
                    params![
                        session.owner(),
                        name,
                        encrypted.id,
                        encrypted.url,
                        encrypted.login,
                        encrypted.password,
                        encrypted.description,
                        encrypted.created_at,
                        encrypted.updated_at,
                        encrypted.synced_at,
                    ],
                )?;
                Ok(())
            }
        }
    }

    /// Active record by name.
    pub async fn get_by_name(&self, session: &Session, name: &str) -> Result<Option<LockBox>> {
        let name = required_name(name)?;
        let db = self.db.lock().await;
        let record = db
            .connection()
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM lockboxes
                     WHERE owner = ? AND name = ? AND deleted_at IS NULL"
                ),
                params![session.owner(), name],
                parse_record,
            )
            .optional()?;
        drop(db);

        record
            .map(|record| self.codec.decrypt_fields(&record))
            .transpose()
    }

    /// All active records for the owner, by name.
    pub async fn list_active(&self, session: &Session) -> Result<Vec<LockBox>> {
        self.query_records(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM lockboxes
                 WHERE owner = ? AND deleted_at IS NULL
                 ORDER BY name"
            ),
            session,
        )
        .await
    }

    /// Soft-deleted rows whose deletion the server has not confirmed yet.
    pub async fn list_pending_deletes(&self, session: &Session) -> Result<Vec<LockBox>> {
        self.query_records(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM lockboxes
                 WHERE owner = ? AND deleted_at IS NOT NULL
                   AND synced_at IS NULL
                 ORDER BY name"
            ),
            session,
        )
        .await
    }

    /// Soft-delete the active record. Returns whether a row was affected.
    ///
    /// The deletion stays pending for the server until `mark_delete_synced`.
    pub async fn mark_deleted(&self, session: &Session, name: &str) -> Result<bool> {
        let name = required_name(name)?;
        let now = now_millis();
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE lockboxes
             SET deleted_at = ?1, updated_at = MAX(updated_at, ?1), synced_at = NULL
             WHERE owner = ?2 AND name = ?3 AND deleted_at IS NULL",
            params![now, session.owner(), name],
        )?;
        Ok(rows > 0)
    }

    /// Merge the non-empty payload fields of `record` into the stored row.
    ///
    /// `updated_at` only moves forward, and a soft delete older than the
    /// update's timestamp is cleared. A non-zero `id` and a present
    /// `synced_at` are recorded as well. Returns whether a row matched.
    pub async fn update(&self, session: &Session, record: &LockBox) -> Result<bool> {
        let name = required_name(&record.name)?;
        let encrypted = self.codec.encrypt_fields(record)?;

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for field in PayloadField::ALL {
            let value = field.value(&encrypted);
            if !value.is_empty() {
                assignments.push(format!("{} = ?", field.column()));
                values.push(Value::Text(value.to_string()));
            }
        }

        assignments.push("updated_at = MAX(updated_at, ?)".to_string());
        values.push(Value::Integer(record.updated_at));
        assignments.push(
            "deleted_at = CASE WHEN deleted_at IS NOT NULL AND deleted_at < ? THEN NULL ELSE deleted_at END"
                .to_string(),
        );
        values.push(Value::Integer(record.updated_at));
        if record.id != 0 {
            assignments.push("remote_id = ?".to_string());
            values.push(Value::Integer(record.id));
        }
        if let Some(synced_at) = record.synced_at {
            // A tombstone that survives this update keeps its pending delete
            assignments.push(
                "synced_at = CASE WHEN deleted_at IS NULL OR deleted_at < ? THEN ? ELSE synced_at END"
                    .to_string(),
            );
            values.push(Value::Integer(record.updated_at));
            values.push(Value::Integer(synced_at));
        }
        values.push(Value::Text(session.owner().to_string()));
        values.push(Value::Text(name.to_string()));

        let sql = format!(
            "UPDATE lockboxes SET {} WHERE owner = ? AND name = ?",
            assignments.join(", ")
        );
        let db = self.db.lock().await;
        let rows = db.connection().execute(&sql, params_from_iter(values))?;
        Ok(rows > 0)
    }

    /// Record a confirmed push of an active row.
    ///
    /// A row soft-deleted since the push keeps its pending delete.
    pub async fn mark_synced(
        &self,
        session: &Session,
        name: &str,
        remote_id: i64,
        synced_at: i64,
    ) -> Result<bool> {
        let name = required_name(name)?;
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE lockboxes
             SET remote_id = CASE WHEN ?1 != 0 THEN ?1 ELSE remote_id END,
                 synced_at = ?2
             WHERE owner = ?3 AND name = ?4 AND deleted_at IS NULL",
            params![remote_id, synced_at, session.owner(), name],
        )?;
        Ok(rows > 0)
    }

    /// Record that the server confirmed a soft delete.
    pub async fn mark_delete_synced(
        &self,
        session: &Session,
        name: &str,
        synced_at: i64,
    ) -> Result<bool> {
        let name = required_name(name)?;
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE lockboxes SET synced_at = ?1
             WHERE owner = ?2 AND name = ?3 AND deleted_at IS NOT NULL",
            params![synced_at, session.owner(), name],
        )?;
        Ok(rows > 0)
    }

    /// Whether any row, active or soft-deleted, exists for the name.
    pub async fn exists(&self, session: &Session, name: &str) -> Result<bool> {
        let name = required_name(name)?;
        let db = self.db.lock().await;
        let exists = db.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM lockboxes WHERE owner = ? AND name = ?)",
            params![session.owner(), name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Hard-delete rows soft-deleted longer than `retention` ago, for every
    /// owner. Returns the number of rows removed.
    pub async fn purge_expired(&self, retention: Duration) -> Result<usize> {
        let cutoff = retention_cutoff(retention);
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "DELETE FROM lockboxes WHERE deleted_at IS NOT NULL AND deleted_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }

    async fn query_records(&self, sql: &str, session: &Session) -> Result<Vec<LockBox>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(sql)?;
        let records = stmt
            .query_map(params![session.owner()], parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(db);

        records
            .iter()
            .map(|record| self.codec.decrypt_fields(record))
            .collect()
    }
}

fn required_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(Error::NameRequired)
    } else {
        Ok(name)
    }
}

/// Parse a lock box from a row selected with `SELECT_COLUMNS`
fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockBox> {
    Ok(LockBox {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        login: row.get(4)?,
        password: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        synced_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}
