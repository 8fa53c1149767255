use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use rivalis_feed::ModeFilter;
use rivalis_feed::leaderboard::DEFAULT_TOP_SCORES;
use rivalis_types::api::{ModeQuery, SubmitScoreRequest};

use crate::messages::internal;
use crate::state::AppState;
use crate::MAX_LIMIT;

pub async fn submit_score(
    State(state): State<AppState>,
    Json(req): Json<SubmitScoreRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let event = state
        .leaderboard
        .submit_score(req.into())
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn top_scores(
    State(state): State<AppState>,
    Query(query): Query<ModeQuery>,
) -> impl IntoResponse {
    let filter = ModeFilter::from_option(query.mode.as_deref());
    let limit = query.limit.unwrap_or(DEFAULT_TOP_SCORES).clamp(1, MAX_LIMIT);
    Json(state.leaderboard.top_scores(&filter, limit).await)
}

pub async fn user_scores(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ModeQuery>,
) -> impl IntoResponse {
    let filter = ModeFilter::from_option(query.mode.as_deref());
    Json(state.leaderboard.user_scores(&user_id, &filter).await)
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<ModeQuery>,
) -> impl IntoResponse {
    let filter = ModeFilter::from_option(query.mode.as_deref());
    Json(state.leaderboard.rankings(&filter).await)
}
