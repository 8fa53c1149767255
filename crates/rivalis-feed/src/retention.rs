use tokio::task::JoinHandle;
use tracing::{info, warn};

use rivalis_db::{Order, Query, StoreError};
use rivalis_types::models::{Record, Stream};

use crate::store::EventStore;

/// Number of global messages kept after a trim.
pub const GLOBAL_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    /// Records in the stream when the trim read it.
    pub examined: usize,
    pub removed: usize,
}

/// Keeps the global stream at its most recent `capacity` messages.
///
/// A trim is a plain read followed by a delete, with no transaction around
/// the two. Appends racing a trim can leave the stream briefly above
/// capacity; the next trim brings it back down.
#[derive(Clone)]
pub struct RetentionManager {
    store: EventStore,
    capacity: usize,
}

impl RetentionManager {
    pub fn new(store: EventStore, capacity: usize) -> Self {
        Self { store, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn trim(&self) -> Result<TrimReport, StoreError> {
        let records = self
            .store
            .query(Query::new(Stream::Global).order(Order::NewestFirst))
            .await?;

        let examined = records.len();
        if examined <= self.capacity {
            return Ok(TrimReport { examined, removed: 0 });
        }

        // Oldest first, everything past the newest `capacity`.
        let expired: Vec<String> = records[self.capacity..]
            .iter()
            .rev()
            .map(Record::id)
            .map(str::to_string)
            .collect();

        let removed = self.store.delete(Stream::Global, expired).await?;
        Ok(TrimReport { examined, removed })
    }

    /// Run a trim in the background. The writer does not wait for it; the
    /// task logs its own outcome and the handle can be awaited or dropped.
    pub fn spawn_trim(&self) -> RetentionTask {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let result = manager.trim().await;
            match &result {
                Ok(report) if report.removed > 0 => {
                    info!(
                        "Retention: removed {} of {} global messages (capacity {})",
                        report.removed, report.examined, manager.capacity
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("Retention trim failed: {}", e),
            }
            result
        });
        RetentionTask { handle }
    }
}

/// Completion handle of a background trim. Dropping it does not cancel the
/// trim.
#[derive(Debug)]
pub struct RetentionTask {
    handle: JoinHandle<Result<TrimReport, StoreError>>,
}

impl RetentionTask {
    pub async fn wait(self) -> Result<TrimReport, StoreError> {
        self.handle.await.unwrap_or_else(|e| {
            Err(StoreError::write(Stream::Global, format!("retention task failed: {}", e)))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
