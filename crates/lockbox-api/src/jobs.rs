use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::ServerStore;

/// Hard-delete expired soft deletes every `period` until shutdown.
pub fn spawn_purge_loop(
    store: ServerStore,
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
            "Server purge loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match store.purge_expired(retention).await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!(purged, "Purged expired lock boxes"),
                        Err(error) => tracing::error!(error = %error, "Server purge failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Server purge loop shutting down");
                        return;
                    }
                }
            }
        }
    })
}
