//! Authoritative lock box and account storage.
//!
//! Lock box payload columns hold whatever the client sent. Clients encrypt
//! before upload, so the server only ever sees ciphertext.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lockbox_core::util::{now_millis, retention_cutoff};
use lockbox_core::{LockBox, PayloadField};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::AppError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS lock_boxes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL DEFAULT '',
        login TEXT NOT NULL DEFAULT '',
        password TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        synced_at INTEGER,
        deleted_at INTEGER,
        UNIQUE (owner, name)
    );

    CREATE INDEX IF NOT EXISTS idx_lock_boxes_deleted
        ON lock_boxes(deleted_at) WHERE deleted_at IS NOT NULL;
";

const SELECT_COLUMNS: &str = "id, owner, name, url, login, password, description,
     created_at, updated_at, synced_at, deleted_at";

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Server-side store shared by all request handlers.
#[derive(Clone)]
pub struct ServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl ServerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    AppError::internal(format!("Failed to create database directory: {error}"))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        match conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get::<_, String>(0)) {
            Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
            Ok(mode) => tracing::warn!(mode = %mode, "Database did not switch to WAL journal mode"),
            Err(error) => tracing::warn!(error = %error, "Failed to enable WAL journal mode"),
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<i64, AppError> {
        let conn = self.conn.lock().await;
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)",
            params![username],
            |row| row.get(0),
        )?;
        if taken {
            return Err(AppError::conflict(format!("user {username}")));
        }
        conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
            params![username, password_hash, now_millis()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE username = ?",
                params![username],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a record. A soft-deleted row with the same name is restored
    /// under its existing id; an active one is a conflict.
    pub async fn create(&self, owner: &str, record: &LockBox) -> Result<i64, AppError> {
        let name = required_name(&record.name)?;
        if !record.has_payload() {
            return Err(AppError::bad_request("lock box data is required"));
        }
        let (created_at, updated_at) = timestamps(record);
        let conn = self.conn.lock().await;

        match find_row(&conn, owner, name)? {
            Some((_, None)) => Err(AppError::conflict(name)),
            Some((id, Some(_))) => {
                conn.execute(
                    "UPDATE lock_boxes
                     SET url = ?1, login = ?2, password = ?3, description = ?4,
                         updated_at = MAX(updated_at, ?5), synced_at = ?6, deleted_at = NULL
                     WHERE id = ?7",
                    params![
                        record.url,
                        record.login,
                        record.password,
                        record.description,
                        updated_at,
                        record.synced_at,
                        id,
                    ],
                )?;
                tracing::debug!(id, "Restored soft-deleted lock box");
                Ok(id)
            }
            None => insert(&conn, owner, name, record, created_at, updated_at),
        }
    }

    /// Insert, or merge into the existing row and restore it.
    ///
    /// An incoming record older than the stored deletion leaves the row
    /// untouched. Returns the row id either way.
    pub async fn upsert(&self, owner: &str, record: &LockBox) -> Result<i64, AppError> {
        let name = required_name(&record.name)?;
        let (created_at, updated_at) = timestamps(record);
        let conn = self.conn.lock().await;

        match find_row(&conn, owner, name)? {
            None => insert(&conn, owner, name, record, created_at, updated_at),
            Some((id, Some(deleted_at))) if updated_at < deleted_at => {
                tracing::debug!(id, "Ignoring upsert older than deletion");
                Ok(id)
            }
            Some((id, _)) => {
                let (mut assignments, mut values) = merge_assignments(record);
                assignments.push("updated_at = MAX(updated_at, ?)".to_string());
                values.push(Value::Integer(updated_at));
                assignments.push("synced_at = ?".to_string());
                values.push(record.synced_at.map_or(Value::Null, Value::Integer));
                assignments.push("deleted_at = NULL".to_string());
                values.push(Value::Integer(id));

                conn.execute(
                    &format!("UPDATE lock_boxes SET {} WHERE id = ?", assignments.join(", ")),
                    params_from_iter(values),
                )?;
                Ok(id)
            }
        }
    }

    /// Merge non-empty fields by name. Returns whether a row matched.
    pub async fn update(&self, owner: &str, record: &LockBox) -> Result<bool, AppError> {
        let name = required_name(&record.name)?;
        let (_, updated_at) = timestamps(record);
        let (mut assignments, mut values) = merge_assignments(record);
        if assignments.is_empty() {
            return Err(AppError::bad_request("no data to update"));
        }

        assignments.push("updated_at = MAX(updated_at, ?)".to_string());
        values.push(Value::Integer(updated_at));
        assignments.push(
            "deleted_at = CASE WHEN deleted_at IS NOT NULL AND deleted_at < ? THEN NULL ELSE deleted_at END"
                .to_string(),
        );
        values.push(Value::Integer(updated_at));
        values.push(Value::Text(owner.to_string()));
        values.push(Value::Text(name.to_string()));

        let conn = self.conn.lock().await;
        let rows = conn.execute(
            &format!(
                "UPDATE lock_boxes SET {} WHERE owner = ? AND name = ?",
                assignments.join(", ")
            ),
            params_from_iter(values),
        )?;
        Ok(rows > 0)
    }

    pub async fn get(&self, owner: &str, name: &str) -> Result<Option<LockBox>, AppError> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM lock_boxes
                     WHERE owner = ? AND name = ? AND deleted_at IS NULL"
                ),
                params![owner, name],
                parse_record,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<LockBox>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM lock_boxes
             WHERE owner = ? AND deleted_at IS NULL
             ORDER BY name"
        ))?;
        let records = stmt
            .query_map(params![owner], parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Soft-delete by name. Deleting an already deleted row is a no-op.
    /// Returns whether any row exists under the name.
    pub async fn delete(&self, owner: &str, name: &str) -> Result<bool, AppError> {
        let now = now_millis();
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE lock_boxes
             SET deleted_at = ?1, updated_at = MAX(updated_at, ?1)
             WHERE owner = ?2 AND name = ?3 AND deleted_at IS NULL",
            params![now, owner, name],
        )?;
        if rows > 0 {
            return Ok(true);
        }
        Ok(find_row(&conn, owner, name)?.is_some())
    }

    /// Hard-delete rows soft-deleted longer than `retention` ago.
    pub async fn purge_expired(&self, retention: Duration) -> Result<usize, AppError> {
        let cutoff = retention_cutoff(retention);
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "DELETE FROM lock_boxes WHERE deleted_at IS NOT NULL AND deleted_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }
}

fn required_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        Err(AppError::bad_request("name is required"))
    } else {
        Ok(name)
    }
}

/// `(created_at, updated_at)`, defaulting missing client stamps to now.
fn timestamps(record: &LockBox) -> (i64, i64) {
    let now = now_millis();
    let created_at = if record.created_at > 0 {
        record.created_at
    } else {
        now
    };
    let updated_at = if record.updated_at > 0 {
        record.updated_at
    } else {
        now
    };
    (created_at, updated_at)
}

fn merge_assignments(record: &LockBox) -> (Vec<String>, Vec<Value>) {
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for field in PayloadField::ALL {
        let value = field.value(record);
        if !value.is_empty() {
            assignments.push(format!("{} = ?", field.column()));
            values.push(Value::Text(value.to_string()));
        }
    }
    (assignments, values)
}

fn find_row(
    conn: &Connection,
    owner: &str,
    name: &str,
) -> Result<Option<(i64, Option<i64>)>, AppError> {
    let row = conn
        .query_row(
            "SELECT id, deleted_at FROM lock_boxes WHERE owner = ? AND name = ?",
            params![owner, name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

fn insert(
    conn: &Connection,
    owner: &str,
    name: &str,
    record: &LockBox,
    created_at: i64,
    updated_at: i64,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO lock_boxes
         (owner, name, url, login, password, description,
          created_at, updated_at, synced_at, deleted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        params![
            owner,
            name,
            record.url,
            record.login,
            record.password,
            record.description,
            created_at,
            updated_at,
            record.synced_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

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

#[cfg(test)]
mod tests {
    use lockbox_core::LockBoxInput;
    use pretty_assertions::assert_eq;

    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    fn store() -> ServerStore {
        ServerStore::open_in_memory().unwrap()
    }

    fn record(name: &str) -> LockBox {
        LockBox::from_input(
            "1",
            LockBoxInput::new(name)
                .with_url("u")
                .with_login("l")
                .with_password("p")
                .with_description("d"),
        )
        .unwrap()
    }

    async fn set_deleted_at(store: &ServerStore, name: &str, deleted_at: i64) {
        store
            .conn
            .lock()
            .await
            .execute(
                "UPDATE lock_boxes SET deleted_at = ? WHERE name = ?",
                params![deleted_at, name],
            )
            .unwrap();
    }

    async fn raw_row(store: &ServerStore, name: &str) -> LockBox {
        store
            .conn
            .lock()
            .await
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM lock_boxes WHERE name = ?"),
                params![name],
                parse_record,
            )
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_rejects_active_duplicate() {
        let store = store();
        let id = store.create("1", &record("vault1")).await.unwrap();
        assert!(id > 0);
        assert!(matches!(
            store.create("1", &record("vault1")).await,
            Err(AppError::Conflict(_))
        ));
        // Names are scoped per owner
        assert!(store.create("2", &record("vault1")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_restores_soft_deleted_row_with_same_id() {
        let store = store();
        let id = store.create("1", &record("vault1")).await.unwrap();
        assert!(store.delete("1", "vault1").await.unwrap());
        assert_eq!(store.get("1", "vault1").await.unwrap(), None);

        let again = LockBox {
            login: "fresh".to_string(),
            ..record("vault1")
        };
        assert_eq!(store.create("1", &again).await.unwrap(), id);
        let restored = store.get("1", "vault1").await.unwrap().unwrap();
        assert_eq!(restored.login, "fresh");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_store_uses_wal_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.db");

        let store = ServerStore::open(&path).unwrap();
        let mode: String = store
            .conn
            .lock()
            .await
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        let id = store.create("1", &record("vault1")).await.unwrap();
        drop(store);

        let reopened = ServerStore::open(&path).unwrap();
        let stored = reopened.get("1", "vault1").await.unwrap().unwrap();
        assert_eq!(stored.id, id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_rejects_empty_payload() {
        let store = store();
        let empty = LockBox::from_input("1", LockBoxInput::new("vault1")).unwrap();
        assert!(matches!(
            store.create("1", &empty).await,
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(store.get("1", "vault1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_is_idempotent() {
        let store = store();
        let incoming = LockBox {
            synced_at: Some(42),
            ..record("vault1")
        };
        let first = store.upsert("1", &incoming).await.unwrap();
        let state = raw_row(&store, "vault1").await;
        let second = store.upsert("1", &incoming).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(raw_row(&store, "vault1").await, state);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_respects_deletion_time() {
        let store = store();
        let original = record("vault1");
        let id = store.create("1", &original).await.unwrap();
        let deleted_at = original.updated_at + HOUR_MS;
        set_deleted_at(&store, "vault1", deleted_at).await;

        let older = LockBox {
            login: "older".to_string(),
            updated_at: deleted_at - 1,
            ..original.clone()
        };
        assert_eq!(store.upsert("1", &older).await.unwrap(), id);
        let untouched = raw_row(&store, "vault1").await;
        assert_eq!(untouched.deleted_at, Some(deleted_at));
        assert_eq!(untouched.login, "l");

        let newer = LockBox {
            login: "newer".to_string(),
            password: String::new(),
            updated_at: deleted_at + 1,
            synced_at: Some(deleted_at + 1),
            ..original
        };
        assert_eq!(store.upsert("1", &newer).await.unwrap(), id);
        let restored = store.get("1", "vault1").await.unwrap().unwrap();
        assert_eq!(restored.id, id);
        assert_eq!(restored.login, "newer");
        assert_eq!(restored.password, "p");
        assert_eq!(restored.updated_at, deleted_at + 1);
        assert_eq!(restored.synced_at, Some(deleted_at + 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_merges_and_reports_missing() {
        let store = store();
        store.create("1", &record("vault1")).await.unwrap();

        let patch = LockBox {
            name: "vault1".to_string(),
            password: "rotated".to_string(),
            ..LockBox::default()
        };
        assert!(store.update("1", &patch).await.unwrap());
        let updated = store.get("1", "vault1").await.unwrap().unwrap();
        assert_eq!(updated.password, "rotated");
        assert_eq!(updated.login, "l");

        let missing = LockBox {
            name: "ghost".to_string(),
            ..patch
        };
        assert!(!store.update("1", &missing).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_without_payload_is_bad_request() {
        let store = store();
        let empty = LockBox {
            name: "vault1".to_string(),
            ..LockBox::default()
        };
        assert!(matches!(
            store.update("1", &empty).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_idempotent_and_hides_row() {
        let store = store();
        store.create("1", &record("alpha")).await.unwrap();
        store.create("1", &record("bravo")).await.unwrap();

        assert!(store.delete("1", "alpha").await.unwrap());
        assert!(store.delete("1", "alpha").await.unwrap());
        assert!(!store.delete("1", "ghost").await.unwrap());

        let names: Vec<_> = store
            .list("1")
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["bravo".to_string()]);
        assert!(store.list("2").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purge_respects_retention_boundary() {
        let store = store();
        store.create("1", &record("recent")).await.unwrap();
        store.create("1", &record("expired")).await.unwrap();
        let now = now_millis();
        set_deleted_at(&store, "recent", now - 23 * HOUR_MS).await;
        set_deleted_at(&store, "expired", now - 25 * HOUR_MS).await;

        let purged = store
            .purge_expired(Duration::from_secs(24 * 3_600))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.delete("1", "recent").await.unwrap());
        assert!(!store.delete("1", "expired").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn usernames_are_unique() {
        let store = store();
        let id = store.create_user("alice", "hash").await.unwrap();
        assert!(matches!(
            store.create_user("alice", "other").await,
            Err(AppError::Conflict(_))
        ));
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.password_hash, "hash");
        assert!(store.find_user("bob").await.unwrap().is_none());
    }
}
