//! Remote-first reconciliation between the local cache and the remote vault.

mod jobs;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use jobs::{spawn_purge_loop, spawn_sync_loop};

use crate::auth::Session;
use crate::db::LocalCache;
use crate::error::{Error, Result};
use crate::models::{LockBox, LockBoxInput};
use crate::remote::RemoteVault;
use crate::util::now_millis;

/// Outcome of one push+pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Active records upserted to the server
    pub pushed: usize,
    /// Local deletions confirmed by the server
    pub deleted: usize,
    /// Server records merged into the cache
    pub pulled: usize,
    /// Per-record failures, logged and left for the next tick
    pub failed: usize,
}

/// Orchestrates lock box operations across the cache and the remote vault.
pub struct Reconciler<R> {
    cache: LocalCache,
    remote: Arc<R>,
}

impl<R> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<R: RemoteVault> Reconciler<R> {
    pub fn new(cache: LocalCache, remote: R) -> Self {
        Self {
            cache,
            remote: Arc::new(remote),
        }
    }

    pub const fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Create remotely, or locally as unsynced when the server can't take it.
    pub async fn create(&self, session: &Session, input: LockBoxInput) -> Result<LockBox> {
        session.validate()?;
        let mut record = LockBox::from_input(session.owner(), input)?;
        if !record.has_payload() {
            return Err(Error::DataRequired);
        }

        match self.remote.create(session, &record).await {
            Ok(id) => {
                record.id = id;
                record.synced_at = Some(now_millis());
                self.store_synced(session, &record).await?;
                tracing::debug!(name = %record.name, id, "Created lock box on server");
                Ok(record)
            }
            Err(error @ (Error::RemoteUnavailable { .. } | Error::AlreadyExists(_))) => {
                tracing::warn!(
                    name = %record.name,
                    error = %error,
                    "Remote create failed; saving locally until next sync"
                );
                self.cache.save(session, &record).await?;
                Ok(record)
            }
            Err(error) => Err(error),
        }
    }

    /// Read one record, falling back to the cache.
    pub async fn get(&self, session: &Session, name: &str) -> Result<LockBox> {
        session.validate()?;
        let name = required_name(name)?;

        match self.remote.get(session, name).await {
            Ok(record) => {
                if let Err(error) = self.absorb(session, &record).await {
                    tracing::warn!(name, error = %error, "Failed to cache fetched lock box");
                }
                Ok(record)
            }
            Err(error) if error.is_remote_unavailable() || error.is_not_found() => {
                tracing::debug!(name, error = %error, "Falling back to local cache");
                self.cache
                    .get_by_name(session, name)
                    .await?
                    .ok_or_else(|| Error::NotFound(name.to_string()))
            }
            Err(error) => Err(error),
        }
    }

    /// List active records, falling back to the cache.
    pub async fn list(&self, session: &Session) -> Result<Vec<LockBox>> {
        session.validate()?;

        match self.remote.list_all(session).await {
            Ok(entries) => {
                let mut records = Vec::with_capacity(entries.len());
                for entry in entries {
                    let record = match entry.record {
                        Ok(record) => record,
                        Err(error) => {
                            tracing::error!(name = %entry.name, error = %error, "Skipping undecryptable lock box");
                            continue;
                        }
                    };
                    if let Err(error) = self.absorb(session, &record).await {
                        tracing::warn!(name = %record.name, error = %error, "Failed to cache listed lock box");
                    }
                    records.push(record);
                }
                Ok(records)
            }
            Err(error) if error.is_remote_unavailable() => {
                tracing::debug!(error = %error, "Listing from local cache");
                self.cache.list_active(session).await
            }
            Err(error) => Err(error),
        }
    }

    /// Merge non-empty fields remotely, or locally pending the next sync.
    pub async fn update(&self, session: &Session, input: LockBoxInput) -> Result<()> {
        session.validate()?;
        let name = required_name(&input.name)?.to_string();
        let record = LockBox {
            owner: session.owner().to_string(),
            name,
            url: input.url,
            login: input.login,
            password: input.password,
            description: input.description,
            updated_at: now_millis(),
            ..LockBox::default()
        };
        if !record.has_payload() {
            return Err(Error::NoDataToUpdate);
        }

        match self.remote.update(session, &record).await {
            Ok(()) => {
                let synced = LockBox {
                    synced_at: Some(now_millis()),
                    ..record
                };
                if !self.cache.update(session, &synced).await? {
                    tracing::debug!(name = %synced.name, "Updated lock box is not cached yet");
                }
                Ok(())
            }
            Err(error) if error.is_remote_unavailable() || error.is_not_found() => {
                tracing::warn!(
                    name = %record.name,
                    error = %error,
                    "Remote update failed; updating local cache"
                );
                if self.cache.update(session, &record).await? {
                    Ok(())
                } else {
                    Err(Error::NotFound(record.name))
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Soft-delete locally, then best-effort on the server.
    pub async fn delete(&self, session: &Session, name: &str) -> Result<()> {
        session.validate()?;
        let name = required_name(name)?;
        let marked = self.cache.mark_deleted(session, name).await?;

        match self.remote.delete(session, name).await {
            Ok(()) => {
                if marked {
                    self.cache
                        .mark_delete_synced(session, name, now_millis())
                        .await?;
                }
                Ok(())
            }
            Err(error) if marked => {
                tracing::warn!(name, error = %error, "Remote delete failed; will retry on sync");
                Ok(())
            }
            Err(error) if error.is_remote_unavailable() || error.is_not_found() => {
                Err(Error::NotFound(name.to_string()))
            }
            Err(error) => Err(error),
        }
    }

    /// Upsert every active cached record and retry pending remote deletes.
    pub async fn push(&self, session: &Session, report: &mut SyncReport) -> Result<()> {
        let tick_at = now_millis();

        for record in self.cache.list_active(session).await? {
            let outgoing = LockBox {
                synced_at: Some(tick_at),
                ..record
            };
            match self.remote.upsert(session, &outgoing).await {
                Ok(id) => {
                    self.cache
                        .mark_synced(session, &outgoing.name, id, tick_at)
                        .await?;
                    report.pushed += 1;
                }
                Err(error @ Error::Auth(_)) => return Err(error),
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(name = %outgoing.name, error = %error, "Failed to push lock box");
                }
            }
        }

        for tombstone in self.cache.list_pending_deletes(session).await? {
            match self.remote.delete(session, &tombstone.name).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    self.cache
                        .mark_delete_synced(session, &tombstone.name, tick_at)
                        .await?;
                    report.deleted += 1;
                }
                Err(error @ Error::Auth(_)) => return Err(error),
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(name = %tombstone.name, error = %error, "Failed to push lock box deletion");
                }
            }
        }

        Ok(())
    }

    /// Merge every server record into the cache.
    pub async fn pull(&self, session: &Session, report: &mut SyncReport) -> Result<()> {
        for entry in self.remote.list_all(session).await? {
            let result = match entry.record {
                Ok(record) => self.absorb(session, &record).await,
                Err(error) => Err(error),
            };
            match result {
                Ok(()) => report.pulled += 1,
                Err(error) if error.is_codec() => {
                    report.failed += 1;
                    tracing::error!(name = %entry.name, error = %error, "Rejected undecryptable lock box");
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(name = %entry.name, error = %error, "Failed to pull lock box");
                }
            }
        }
        Ok(())
    }

    /// One reconciliation tick: push fully, then pull.
    pub async fn sync_tick(&self, session: &Session) -> Result<SyncReport> {
        session.validate()?;
        let mut report = SyncReport::default();
        self.push(session, &mut report).await?;
        self.pull(session, &mut report).await?;
        Ok(report)
    }

    /// Hard-delete expired local tombstones.
    pub async fn purge(&self, retention: Duration) -> Result<usize> {
        self.cache.purge_expired(retention).await
    }

    /// Insert the server's version when missing, then merge it in.
    async fn absorb(&self, session: &Session, record: &LockBox) -> Result<()> {
        if !self.cache.exists(session, &record.name).await? {
            match self.cache.save(session, record).await {
                Ok(()) | Err(Error::AlreadyExists(_)) => {}
                Err(error) => return Err(error),
            }
        }
        self.cache.update(session, record).await?;
        Ok(())
    }

    async fn store_synced(&self, session: &Session, record: &LockBox) -> Result<()> {
        match self.cache.save(session, record).await {
            Err(Error::AlreadyExists(_)) => {
                self.cache.update(session, record).await?;
                Ok(())
            }
            other => other,
        }
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
