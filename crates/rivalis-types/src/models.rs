use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Streams --

/// The three logical streams held by the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Global,
    Direct,
    Scores,
}

impl Stream {
    /// Only the global broadcast stream is ever trimmed.
    pub fn is_trimmable(self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Direct => "direct",
            Self::Scores => "scores",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Global,
    Direct,
}

/// Sender identity as supplied by the profile collaborator. Copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: String,
    pub nickname: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    pub nickname: String,
}

/// A chat message as persisted by the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel: ChannelKind,
    pub author: Author,
    pub recipient: Option<Recipient>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// The conversation this message belongs to, if it is a direct message.
    pub fn conversation(&self) -> Option<ConversationKey> {
        self.recipient
            .as_ref()
            .map(|to| ConversationKey::new(&self.author.user_id, &to.user_id))
    }
}

// -- Scores --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub game_mode: String,
    pub score: i64,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// One leaderboard line: a user's total and the per-mode subtotals behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    pub user_id: String,
    pub user_name: String,
    pub total: i64,
    pub by_mode: BTreeMap<String, i64>,
}

// -- Conversations --

/// Unordered pair of participants identifying a direct-message thread.
///
/// The smaller id is always stored first, so `new(a, b) == new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    first: String,
    second: String,
}

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { first: a.to_string(), second: b.to_string() }
        } else {
            Self { first: b.to_string(), second: a.to_string() }
        }
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }

    /// True when `(from, to)` is either orientation of this pair.
    pub fn matches(&self, from: &str, to: &str) -> bool {
        (from == self.first && to == self.second) || (from == self.second && to == self.first)
    }

    /// Canonical form used by the per-pair index column. The byte length of
    /// the first id prefixes the key, so no pair of ids can collide with
    /// another whatever characters they contain.
    pub fn storage_key(&self) -> String {
        format!("{}:{}{}", self.first.len(), self.first, self.second)
    }
}

// -- Records --

#[derive(Debug, Clone)]
pub struct NewGlobalMessage {
    pub author: Author,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewDirectMessage {
    pub author: Author,
    pub recipient: Recipient,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewScoreEvent {
    pub user_id: String,
    pub user_name: String,
    pub game_mode: String,
    pub score: i64,
    pub metadata: serde_json::Value,
}

/// A record about to be appended. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub enum NewRecord {
    Global(NewGlobalMessage),
    Direct(NewDirectMessage),
    Score(NewScoreEvent),
}

impl NewRecord {
    pub fn stream(&self) -> Stream {
        match self {
            Self::Global(_) => Stream::Global,
            Self::Direct(_) => Stream::Direct,
            Self::Score(_) => Stream::Scores,
        }
    }
}

/// A persisted record from any of the three streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Message(Message),
    Score(ScoreEvent),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Self::Message(m) => &m.id,
            Self::Score(s) => &s.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.timestamp,
            Self::Score(s) => s.timestamp,
        }
    }

    pub fn stream(&self) -> Stream {
        match self {
            Self::Message(m) if m.channel == ChannelKind::Global => Stream::Global,
            Self::Message(_) => Stream::Direct,
            Self::Score(_) => Stream::Scores,
        }
    }

    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Score(_) => None,
        }
    }

    pub fn into_score(self) -> Option<ScoreEvent> {
        match self {
            Self::Score(s) => Some(s),
            Self::Message(_) => None,
        }
    }
}
