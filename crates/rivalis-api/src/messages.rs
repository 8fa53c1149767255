use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};

use rivalis_db::StoreError;
use rivalis_types::api::{SendDirectMessageRequest, SendGlobalMessageRequest, WindowQuery};
use rivalis_types::models::ConversationKey;

use crate::clamp_limit;
use crate::state::AppState;

pub async fn send_global(
    State(state): State<AppState>,
    Json(req): Json<SendGlobalMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.text.trim().is_empty() {
        warn!("Rejected empty global message from {}", req.user_id);
        return Err(StatusCode::BAD_REQUEST);
    }

    let sent = state
        .chat
        .send_global_message(req.into())
        .await
        .map_err(internal)?;

    // The retention trim runs on; its outcome is logged by the task itself.
    Ok((StatusCode::CREATED, Json(sent.message)))
}

pub async fn recent_global(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> impl IntoResponse {
    Json(state.chat.recent_global(clamp_limit(query.limit)).await)
}

pub async fn send_direct(
    State(state): State<AppState>,
    Json(req): Json<SendDirectMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.text.trim().is_empty() {
        warn!("Rejected empty direct message from {}", req.from_user_id);
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = state
        .chat
        .send_direct_message(req.into())
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn conversation(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(String, String)>,
    Query(query): Query<WindowQuery>,
) -> impl IntoResponse {
    let key = ConversationKey::new(&user_a, &user_b);
    Json(state.chat.conversation(&key, clamp_limit(query.limit)).await)
}

pub async fn outbox(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> impl IntoResponse {
    Json(state.chat.outbox(&user_id, clamp_limit(query.limit)).await)
}

pub(crate) fn internal(e: StoreError) -> StatusCode {
    error!("Store error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
