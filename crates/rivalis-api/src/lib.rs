pub mod messages;
pub mod scores;
pub mod state;

use axum::{
    Json, Router,
    routing::{get, post},
};

use rivalis_types::api::HealthResponse;

pub use state::{AppState, AppStateInner};

/// Largest window any read endpoint hands out.
pub const MAX_LIMIT: u32 = 200;

/// All REST routes, bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/global/messages",
            get(messages::recent_global).post(messages::send_global),
        )
        .route("/direct/messages", post(messages::send_direct))
        .route(
            "/direct/conversations/{user_a}/{user_b}",
            get(messages::conversation),
        )
        .route("/direct/outbox/{user_id}", get(messages::outbox))
        .route("/scores", post(scores::submit_score))
        .route("/scores/top", get(scores::top_scores))
        .route("/scores/users/{user_id}", get(scores::user_scores))
        .route("/leaderboard", get(scores::leaderboard))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

pub(crate) fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(rivalis_feed::DEFAULT_WINDOW).clamp(1, MAX_LIMIT)
}
