use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use rivalis_db::{Database, Query, StoreError};
use rivalis_types::models::{NewRecord, Record, Stream};

/// Capacity of the change channel. A subscriber that falls further behind
/// than this re-queries once instead of replaying every change.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Notification that the contents of a stream changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub stream: Stream,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Appended { id: String },
    Removed { count: usize },
}

/// Async handle to the event store. Cheap to clone; every service that
/// needs the store receives one through its constructor.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<EventStoreInner>,
}

struct EventStoreInner {
    db: Database,
    changes: broadcast::Sender<StoreChange>,
}

impl EventStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EventStoreInner { db, changes }),
        }
    }

    /// Direct access to the underlying database.
    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Receive a notification for every successful append or delete.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    pub async fn append(&self, record: NewRecord) -> Result<Record, StoreError> {
        let stream = record.stream();
        let inner = self.inner.clone();
        let stored = tokio::task::spawn_blocking(move || inner.db.append(&record))
            .await
            .map_err(|e| StoreError::write(stream, format!("store task failed: {}", e)))??;

        debug!("Appended {} to {} stream", stored.id(), stream);
        self.notify(StoreChange {
            stream,
            kind: ChangeKind::Appended { id: stored.id().to_string() },
        });
        Ok(stored)
    }

    pub async fn query(&self, query: Query) -> Result<Vec<Record>, StoreError> {
        let stream = query.stream;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.db.query(&query))
            .await
            .map_err(|e| StoreError::read(stream, format!("store task failed: {}", e)))?
    }

    /// Read path for views: a `ReadFailure` is logged and degrades to an
    /// empty result.
    pub async fn query_or_empty(&self, query: Query) -> Vec<Record> {
        match self.query(query).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    pub async fn delete(&self, stream: Stream, ids: Vec<String>) -> Result<usize, StoreError> {
        let inner = self.inner.clone();
        let count = tokio::task::spawn_blocking(move || inner.db.delete(stream, &ids))
            .await
            .map_err(|e| StoreError::write(stream, format!("store task failed: {}", e)))??;

        if count > 0 {
            self.notify(StoreChange { stream, kind: ChangeKind::Removed { count } });
        }
        Ok(count)
    }

    fn notify(&self, change: StoreChange) {
        // No receivers just means nobody is subscribed right now
        let _ = self.inner.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{global, temp_store};

    #[tokio::test]
    async fn append_publishes_change() {
        let store = temp_store();
        let mut changes = store.changes();

        let stored = store.append(global("a", "hello")).await.unwrap();
        let change = changes.recv().await.unwrap();
        assert_eq!(change.stream, Stream::Global);
        assert_eq!(change.kind, ChangeKind::Appended { id: stored.id().to_string() });
    }

    #[tokio::test]
    async fn failed_query_degrades_to_empty() {
        let store = temp_store();
        store.append(global("a", "hello")).await.unwrap();

        let records = store
            .query_or_empty(Query::new(Stream::Global).game_mode("solo"))
            .await;
        assert!(records.is_empty());

        let err = store.query(Query::new(Stream::Global).game_mode("solo")).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadFailure { .. }));
    }

    #[tokio::test]
    async fn empty_delete_is_silent() {
        let store = temp_store();
        let mut changes = store.changes();
        assert_eq!(store.delete(Stream::Global, Vec::new()).await.unwrap(), 0);

        store.append(global("a", "after")).await.unwrap();
        // first change seen is the append, not a removal
        assert!(matches!(changes.recv().await.unwrap().kind, ChangeKind::Appended { .. }));
    }
}
