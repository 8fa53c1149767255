use tracing::{error, info};

use rivalis_db::{Query, StoreError};
use rivalis_types::models::{
    ConversationKey, Message, NewDirectMessage, NewGlobalMessage, NewRecord, Record, Stream,
};

use crate::conversation::{ConversationStrategy, ConversationView};
use crate::retention::{RetentionManager, RetentionTask};
use crate::store::EventStore;
use crate::subscription::{Subscription, SubscriptionService};

/// A stored global message plus the retention trim it triggered.
#[derive(Debug)]
pub struct SentGlobalMessage {
    pub message: Message,
    pub retention: RetentionTask,
}

/// Global broadcast and direct-message operations.
#[derive(Clone)]
pub struct ChatService {
    store: EventStore,
    subscriptions: SubscriptionService,
    retention: RetentionManager,
    conversations: ConversationView,
}

impl ChatService {
    pub fn new(
        store: EventStore,
        global_capacity: usize,
        strategy: ConversationStrategy,
    ) -> Self {
        let subscriptions = SubscriptionService::new(store.clone());
        Self {
            retention: RetentionManager::new(store.clone(), global_capacity),
            conversations: ConversationView::new(subscriptions.clone(), strategy),
            subscriptions,
            store,
        }
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    // -- Global --

    /// Append to the global stream and start a retention trim without
    /// waiting for it.
    pub async fn send_global_message(
        &self,
        message: NewGlobalMessage,
    ) -> Result<SentGlobalMessage, StoreError> {
        let stored = self
            .store
            .append(NewRecord::Global(message))
            .await
            .inspect_err(|e| error!("Error sending global message: {}", e))?;

        let message = into_message(stored, Stream::Global)?;
        let retention = self.retention.spawn_trim();
        Ok(SentGlobalMessage { message, retention })
    }

    pub async fn recent_global(&self, limit: u32) -> Vec<Message> {
        let mut records = self
            .store
            .query_or_empty(Query::new(Stream::Global).limit(limit))
            .await;
        records.reverse();
        messages(records)
    }

    pub async fn subscribe_global(&self, limit: u32) -> Subscription<Message> {
        self.subscriptions
            .subscribe_with(Query::new(Stream::Global).limit(limit), messages)
            .await
    }

    // -- Direct --

    pub async fn send_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<Message, StoreError> {
        let from = message.author.user_id.clone();
        let to = message.recipient.user_id.clone();
        let stored = self
            .store
            .append(NewRecord::Direct(message))
            .await
            .inspect_err(|e| error!("Error sending direct message: {}", e))?;

        info!("Direct message {} from {} to {}", stored.id(), from, to);
        into_message(stored, Stream::Direct)
    }

    /// Latest direct messages sent by one user, ascending.
    pub async fn outbox(&self, user_id: &str, limit: u32) -> Vec<Message> {
        let mut records = self
            .store
            .query_or_empty(Query::new(Stream::Direct).user(user_id).limit(limit))
            .await;
        records.reverse();
        messages(records)
    }

    pub async fn subscribe_outbox(&self, user_id: &str, limit: u32) -> Subscription<Message> {
        self.subscriptions
            .subscribe_with(Query::new(Stream::Direct).user(user_id).limit(limit), messages)
            .await
    }

    pub async fn conversation(&self, key: &ConversationKey, limit: u32) -> Vec<Message> {
        self.conversations.snapshot(key, limit).await
    }

    pub async fn subscribe_conversation(
        &self,
        key: ConversationKey,
        limit: u32,
    ) -> Subscription<Message> {
        self.conversations.subscribe(key, limit).await
    }
}

fn messages(records: Vec<Record>) -> Vec<Message> {
    records.into_iter().filter_map(Record::into_message).collect()
}

fn into_message(record: Record, stream: Stream) -> Result<Message, StoreError> {
    record
        .into_message()
        .ok_or_else(|| StoreError::write(stream, "store returned a non-message record"))
}
