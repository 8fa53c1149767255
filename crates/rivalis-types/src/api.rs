use serde::{Deserialize, Serialize};

use crate::models::{
    Author, NewDirectMessage, NewGlobalMessage, NewScoreEvent, Recipient,
};

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGlobalMessageRequest {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub avatar_url: String,
    pub text: String,
}

impl From<SendGlobalMessageRequest> for NewGlobalMessage {
    fn from(req: SendGlobalMessageRequest) -> Self {
        Self {
            author: Author {
                user_id: req.user_id,
                nickname: req.nickname,
                avatar_url: req.avatar_url,
            },
            text: req.text,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendDirectMessageRequest {
    pub from_user_id: String,
    pub from_nickname: String,
    #[serde(default)]
    pub from_avatar_url: String,
    pub to_user_id: String,
    pub to_nickname: String,
    pub text: String,
}

impl From<SendDirectMessageRequest> for NewDirectMessage {
    fn from(req: SendDirectMessageRequest) -> Self {
        Self {
            author: Author {
                user_id: req.from_user_id,
                nickname: req.from_nickname,
                avatar_url: req.from_avatar_url,
            },
            recipient: Recipient {
                user_id: req.to_user_id,
                nickname: req.to_nickname,
            },
            text: req.text,
        }
    }
}

// -- Scores --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitScoreRequest {
    pub user_id: String,
    pub user_name: String,
    pub game_mode: String,
    pub score: i64,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl From<SubmitScoreRequest> for NewScoreEvent {
    fn from(req: SubmitScoreRequest) -> Self {
        Self {
            user_id: req.user_id,
            user_name: req.user_name,
            game_mode: req.game_mode,
            score: req.score,
            metadata: req.metadata,
        }
    }
}

// -- Queries --

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ModeQuery {
    pub mode: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
