use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};
use crate::{
    error::Result,
    storage::{db::Database, models::Demande},
};

/// Immutable view of the whole `demandes` collection at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub demandes: Vec<Demande>,
    pub version: u64,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            demandes: Vec::new(),
            version: 0,
            taken_at: Utc::now(),
        }
    }
}

/// Shared handle over the database that republishes the full record set
/// after every change.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    tx: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl Store {
    pub async fn new(db: Database) -> Result<Self> {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::empty()));
        let store = Self {
            db: Arc::new(Mutex::new(db)),
            tx: Arc::new(tx),
        };
        store.refresh().await?;
        Ok(store)
    }

    pub async fn open(path: &str) -> Result<Self> {
        Self::new(Database::new(path)?).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Re-read the collection and publish it if it changed. The lock is held
    /// until the snapshot is published so an older read never lands last.
    pub async fn refresh(&self) -> Result<bool> {
        let db = self.db.lock().await;
        let fresh = db.list_demandes()?;

        let changed = self.tx.send_if_modified(|current| {
            if current.demandes == fresh {
                return false;
            }
            *current = Arc::new(Snapshot {
                demandes: fresh,
                version: current.version + 1,
                taken_at: Utc::now(),
            });
            true
        });
        drop(db);

        if changed {
            debug!("Published snapshot v{}", self.tx.borrow().version);
        }
        Ok(changed)
    }

    /// Run a read against the database.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let db = self.db.lock().await;
        f(&*db)
    }

    /// Run a write against the database, then republish. A failed write
    /// leaves the published snapshot untouched. A committed write is reported
    /// as such even when republishing fails; the next refresh catches up.
    pub async fn write<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let outcome = {
            let db = self.db.lock().await;
            f(&*db)
        };

        match outcome {
            Ok(value) => {
                if let Err(e) = self.refresh().await {
                    warn!("Snapshot refresh after {} failed: {}", what, e);
                }
                Ok(value)
            }
            Err(e) => {
                error!("Store write failed ({}): {}", what, e);
                Err(e)
            }
        }
    }
}
