use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rivalis_db::{Order, Query};
use rivalis_types::models::Record;

use crate::store::{EventStore, StoreChange};

/// One delivered materialization of a subscribed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    /// Starts at 1 and increases by one per delivered window.
    pub revision: u64,
    /// Ascending by timestamp for raw and filtered windows.
    pub records: Vec<T>,
}

/// Stops a subscription's background worker.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A live view over the store. Every change to the matched record set
/// replaces the whole window; intermediate windows a slow consumer never
/// looked at are dropped.
///
/// Call [`Subscription::cancel`] when done. The worker also stops on its own
/// once every update receiver has been dropped.
pub struct Subscription<T> {
    updates: watch::Receiver<Window<T>>,
    cancel: CancelHandle,
}

impl<T: Clone> Subscription<T> {
    /// Latest delivered window.
    pub fn current(&self) -> Window<T> {
        self.updates.borrow().clone()
    }

    /// Wait for the next window. Returns `None` once the subscription ended.
    pub async fn next(&mut self) -> Option<Window<T>> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    pub fn updates(&self) -> watch::Receiver<Window<T>> {
        self.updates.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn into_parts(self) -> (watch::Receiver<Window<T>>, CancelHandle) {
        (self.updates, self.cancel)
    }
}

/// Turns store queries into live, ordered windows.
#[derive(Clone)]
pub struct SubscriptionService {
    store: EventStore,
}

impl SubscriptionService {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Subscribe to the raw records matched by `query`.
    pub async fn subscribe(&self, query: Query) -> Subscription<Record> {
        self.subscribe_with(query, |records| records).await
    }

    /// Subscribe to a derived view of the records matched by `query`.
    ///
    /// `project` receives the matched window in ascending timestamp order
    /// (a newest-first backend result is reversed first) and returns what the
    /// consumer sees. The first window is materialized before this returns.
    pub async fn subscribe_with<T, F>(&self, query: Query, project: F) -> Subscription<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(Vec<Record>) -> Vec<T> + Send + 'static,
    {
        // Listen before the first read so no change can slip in between.
        let changes = self.store.changes();
        let raw = materialize(&self.store, &query).await;
        let initial = project(raw);

        let (tx, rx) = watch::channel(Window { revision: 1, records: initial });
        let token = CancellationToken::new();

        tokio::spawn(run_worker(
            self.store.clone(),
            query,
            project,
            changes,
            tx,
            token.clone(),
        ));

        Subscription {
            updates: rx,
            cancel: CancelHandle { token },
        }
    }
}

async fn materialize(store: &EventStore, query: &Query) -> Vec<Record> {
    let mut records = store.query_or_empty(query.clone()).await;
    if query.order == Order::NewestFirst {
        records.reverse();
    }
    records
}

async fn run_worker<T, F>(
    store: EventStore,
    query: Query,
    project: F,
    mut changes: broadcast::Receiver<StoreChange>,
    tx: watch::Sender<Window<T>>,
    token: CancellationToken,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(Vec<Record>) -> Vec<T> + Send + 'static,
{
    let stream = query.stream;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Subscription on {} stream cancelled", stream);
                break;
            }
            _ = tx.closed() => {
                debug!("Subscription on {} stream dropped by consumer", stream);
                break;
            }
            change = changes.recv() => match change {
                Ok(change) if change.stream != stream => continue,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscription on {} stream lagged by {} changes, re-reading", stream, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }

        // Coalesce anything else already queued; one re-read covers it all.
        loop {
            match changes.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        // `project` is only Send, so it must not be borrowed across the read.
        let raw = materialize(&store, &query).await;
        let records = project(raw);

        // Unchanged windows are not redelivered.
        tx.send_if_modified(|window| {
            if window.records == records {
                return false;
            }
            window.revision += 1;
            window.records = records;
            true
        });
    }
}
