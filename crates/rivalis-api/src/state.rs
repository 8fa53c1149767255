use std::sync::Arc;

use rivalis_feed::{ChatService, LeaderboardService};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub leaderboard: LeaderboardService,
}

impl AppStateInner {
    pub fn new(chat: ChatService, leaderboard: LeaderboardService) -> AppState {
        Arc::new(Self { chat, leaderboard })
    }
}
