//! Periodic background work: push/pull reconciliation and tombstone purge.
//!
//! Both loops tick on a `tokio::time::interval` and stop when the shutdown
//! channel flips to `true` or its sender is dropped.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Reconciler, SyncReport};
use crate::auth::Session;
use crate::remote::RemoteVault;

/// Failures in a row before a loop logs at error level.
const ESCALATE_AFTER: u32 = 5;

/// Run `sync_tick` every `period` until shutdown.
pub fn spawn_sync_loop<R: RemoteVault + 'static>(
    reconciler: Reconciler<R>,
    session: Session,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures: u32 = 0;
        tracing::info!(
            owner = %session.owner(),
            period_secs = period.as_secs(),
            "Sync loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match reconciler.sync_tick(&session).await {
                        Ok(report) => {
                            consecutive_failures = 0;
                            if report != SyncReport::default() {
                                tracing::info!(
                                    pushed = report.pushed,
                                    deleted = report.deleted,
                                    pulled = report.pulled,
                                    failed = report.failed,
                                    "Sync tick complete"
                                );
                            }
                        }
                        Err(error) => {
                            consecutive_failures = consecutive_failures.saturating_add(1);
                            if consecutive_failures >= ESCALATE_AFTER {
                                tracing::error!(
                                    error = %error,
                                    consecutive_failures,
                                    "Sync keeps failing; server may be down"
                                );
                            } else {
                                tracing::warn!(
                                    error = %error,
                                    consecutive_failures,
                                    "Sync tick failed, will retry next tick"
                                );
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Sync loop shutting down");
                        return;
                    }
                }
            }
        }
    })
}

/// Hard-delete expired tombstones every `period` until shutdown.
pub fn spawn_purge_loop<R: RemoteVault + 'static>(
    reconciler: Reconciler<R>,
    retention: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            retention_secs = retention.as_secs(),
            period_secs = period.as_secs(),
            "Purge loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match reconciler.purge(retention).await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!(purged, "Purged expired lock boxes"),
                        Err(error) => tracing::error!(error = %error, "Failed to purge expired lock boxes"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Purge loop shutting down");
                        return;
                    }
                }
            }
        }
    })
}
