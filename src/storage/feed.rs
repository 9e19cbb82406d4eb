use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::storage::store::Store;

/// Polls the store so that changes written by other processes sharing the
/// same database file reach this process's subscribers.
pub struct SnapshotPoller {
    store: Store,
    interval: Duration,
}

impl SnapshotPoller {
    pub fn new(store: Store, interval_secs: u64) -> Self {
        Self {
            store,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(self) {
        info!("Polling store every {}s", self.interval.as_secs());
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            match self.store.refresh().await {
                Ok(true) => debug!("Store changed, snapshot republished"),
                Ok(false) => {}
                Err(e) => warn!("Failed to refresh snapshot: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Demande};
    use chrono::Utc;

    #[tokio::test]
    async fn test_poller_picks_up_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let path = path.to_str().unwrap().to_string();

        let store = Store::open(&path).await.unwrap();
        let mut rx = store.subscribe();
        let handle = SnapshotPoller::new(store.clone(), 1).spawn();

        // A second connection plays the other session.
        let other = Database::new(&path).unwrap();
        other
            .insert_demande(&Demande::new("BAMBA Ali", "AS2", 2, "2025-03", Utc::now()))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.borrow().demandes.len(), 1);

        handle.abort();
    }
}
