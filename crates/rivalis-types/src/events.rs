use serde::{Deserialize, Serialize};

use crate::models::{Message, RankingRow};

/// Events sent over the `/feed` WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Connection is ready to accept subscriptions
    Ready { connection_id: String },

    /// Full materialized window for a subscription
    Snapshot {
        subscription_id: String,
        revision: u64,
        payload: FeedPayload,
    },

    /// Incremental change against the previously delivered window
    Diff {
        subscription_id: String,
        revision: u64,
        added: FeedPayload,
        changed: FeedPayload,
        removed: Vec<String>,
    },

    /// Subscription was cancelled on request
    Unsubscribed { subscription_id: String },

    /// A command could not be honoured
    Error { message: String },
}

/// Window contents, tagged by the kind of view they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum FeedPayload {
    Messages(Vec<Message>),
    Rankings(Vec<RankingRow>),
}

/// Commands sent FROM client TO server over the feed WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedCommand {
    /// Open a live view. Reusing an id replaces the previous subscription.
    Subscribe {
        subscription_id: String,
        target: FeedTarget,
        #[serde(default)]
        incremental: bool,
    },

    /// Cancel a live view
    Unsubscribe { subscription_id: String },
}

/// What a feed subscription watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum FeedTarget {
    Global {
        limit: Option<u32>,
    },
    Conversation {
        user_a: String,
        user_b: String,
        limit: Option<u32>,
    },
    Outbox {
        user_id: String,
        limit: Option<u32>,
    },
    Leaderboard {
        mode: Option<String>,
    },
}
