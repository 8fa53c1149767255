use std::str::FromStr;

use rivalis_db::Query;
use rivalis_types::models::{ConversationKey, Message, Record, Stream};

use crate::subscription::{Subscription, SubscriptionService};

/// How a two-party thread is carved out of the shared direct stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationStrategy {
    /// Read the latest `2 × limit` direct messages of everyone, keep the ones
    /// between the pair, then keep the trailing `limit`.
    ///
    /// Known limitation: when more than `2 × limit` messages of other pairs
    /// land between two messages of this pair, the older ones fall out of
    /// the raw window and are never shown.
    #[default]
    RawWindow,
    /// Read the pair's own messages through the per-pair index.
    PairIndex,
}

impl FromStr for ConversationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "window" | "raw-window" => Ok(Self::RawWindow),
            "pair-index" | "index" => Ok(Self::PairIndex),
            other => Err(format!("unknown conversation strategy '{}'", other)),
        }
    }
}

/// Derives ordered two-party threads from the direct-message stream.
#[derive(Clone)]
pub struct ConversationView {
    subscriptions: SubscriptionService,
    strategy: ConversationStrategy,
}

impl ConversationView {
    pub fn new(subscriptions: SubscriptionService, strategy: ConversationStrategy) -> Self {
        Self { subscriptions, strategy }
    }

    pub fn strategy(&self) -> ConversationStrategy {
        self.strategy
    }

    fn query(&self, key: &ConversationKey, limit: u32) -> Query {
        match self.strategy {
            ConversationStrategy::RawWindow => {
                Query::new(Stream::Direct).limit(limit.saturating_mul(2))
            }
            ConversationStrategy::PairIndex => {
                Query::new(Stream::Direct).pair(key.clone()).limit(limit)
            }
        }
    }

    /// Live thread between the two participants, ascending by timestamp.
    pub async fn subscribe(&self, key: ConversationKey, limit: u32) -> Subscription<Message> {
        let query = self.query(&key, limit);
        self.subscriptions
            .subscribe_with(query, move |records| select_conversation(records, &key, limit))
            .await
    }

    /// One-shot read of the same view.
    pub async fn snapshot(&self, key: &ConversationKey, limit: u32) -> Vec<Message> {
        let mut records = self
            .subscriptions
            .store()
            .query_or_empty(self.query(key, limit))
            .await;
        records.reverse();
        select_conversation(records, key, limit)
    }
}

/// Keep the pair's messages from an ascending raw window, then the trailing
/// `limit` of those.
pub fn select_conversation(
    records: Vec<Record>,
    key: &ConversationKey,
    limit: u32,
) -> Vec<Message> {
    let mut messages: Vec<Message> = records
        .into_iter()
        .filter_map(Record::into_message)
        .filter(|m| {
            m.recipient
                .as_ref()
                .is_some_and(|to| key.matches(&m.author.user_id, &to.user_id))
        })
        .collect();

    let limit = limit as usize;
    if messages.len() > limit {
        messages.drain(..messages.len() - limit);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{direct, temp_store};
    use std::time::Duration;

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn raw_window_keeps_only_the_pair() {
        let store = temp_store();
        store.append(direct("alice", "bob", "hi bob")).await.unwrap();
        store.append(direct("carol", "bob", "hi from carol")).await.unwrap();
        store.append(direct("bob", "alice", "hi alice")).await.unwrap();
        store.append(direct("alice", "carol", "side chat")).await.unwrap();

        let view = ConversationView::new(
            SubscriptionService::new(store),
            ConversationStrategy::RawWindow,
        );
        let key = ConversationKey::new("alice", "bob");
        let messages = view.snapshot(&key, 10).await;
        assert_eq!(texts(&messages), vec!["hi bob", "hi alice"]);
        for m in &messages {
            let to = &m.recipient.as_ref().unwrap().user_id;
            assert!(key.matches(&m.author.user_id, to));
        }
    }

    #[tokio::test]
    async fn truncates_to_trailing_limit() {
        let store = temp_store();
        for i in 0..6 {
            store.append(direct("alice", "bob", &format!("m{}", i))).await.unwrap();
        }
        let view = ConversationView::new(SubscriptionService::new(store), Default::default());
        let messages = view.snapshot(&ConversationKey::new("bob", "alice"), 3).await;
        assert_eq!(texts(&messages), vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn raw_window_starves_behind_other_traffic() {
        let store = temp_store();
        store.append(direct("alice", "bob", "old")).await.unwrap();
        // More than 2 × limit messages between other people
        for i in 0..5 {
            store.append(direct("carol", "dave", &format!("noise {}", i))).await.unwrap();
        }
        store.append(direct("bob", "alice", "new")).await.unwrap();

        let key = ConversationKey::new("alice", "bob");
        let subscriptions = SubscriptionService::new(store);

        let raw = ConversationView::new(subscriptions.clone(), ConversationStrategy::RawWindow);
        assert_eq!(texts(&raw.snapshot(&key, 2).await), vec!["new"]);

        let indexed = ConversationView::new(subscriptions, ConversationStrategy::PairIndex);
        assert_eq!(texts(&indexed.snapshot(&key, 2).await), vec!["old", "new"]);
    }

    #[tokio::test]
    async fn live_thread_updates_on_pair_messages() {
        let store = temp_store();
        let view = ConversationView::new(
            SubscriptionService::new(store.clone()),
            ConversationStrategy::PairIndex,
        );
        let mut sub = view.subscribe(ConversationKey::new("alice", "bob"), 10).await;
        assert!(sub.current().records.is_empty());

        store.append(direct("bob", "alice", "ping")).await.unwrap();
        let window = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(texts(&window.records), vec!["ping"]);
        sub.cancel();
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("window".parse::<ConversationStrategy>(), Ok(ConversationStrategy::RawWindow));
        assert_eq!("Pair-Index".parse::<ConversationStrategy>(), Ok(ConversationStrategy::PairIndex));
        assert!("fanout".parse::<ConversationStrategy>().is_err());
    }
}
