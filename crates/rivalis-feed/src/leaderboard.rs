use tracing::{error, info};

use rivalis_db::{Order, Query, StoreError};
use rivalis_types::models::{NewRecord, NewScoreEvent, RankingRow, Record, ScoreEvent, Stream};

use crate::ranking::{ModeFilter, rank};
use crate::store::EventStore;
use crate::subscription::{Subscription, SubscriptionService};

/// Number of score events returned by top-score reads when unspecified.
pub const DEFAULT_TOP_SCORES: u32 = 10;

/// Score submission, top-score reads and live rankings.
#[derive(Clone)]
pub struct LeaderboardService {
    store: EventStore,
    subscriptions: SubscriptionService,
}

impl LeaderboardService {
    pub fn new(store: EventStore) -> Self {
        Self {
            subscriptions: SubscriptionService::new(store.clone()),
            store,
        }
    }

    pub async fn submit_score(&self, score: NewScoreEvent) -> Result<ScoreEvent, StoreError> {
        let stored = self
            .store
            .append(NewRecord::Score(score))
            .await
            .inspect_err(|e| error!("Error submitting score: {}", e))?;

        info!("Score submitted successfully: {}", stored.id());
        stored
            .into_score()
            .ok_or_else(|| StoreError::write(Stream::Scores, "store returned a non-score record"))
    }

    /// Highest individual score events, optionally within one mode.
    pub async fn top_scores(&self, filter: &ModeFilter, limit: u32) -> Vec<ScoreEvent> {
        let mut query = Query::new(Stream::Scores).order(Order::HighestScore).limit(limit);
        if let Some(mode) = filter.mode() {
            query = query.game_mode(mode);
        }
        scores(self.store.query_or_empty(query).await)
    }

    /// Highest score events across every mode.
    pub async fn all_top_scores(&self, limit: u32) -> Vec<ScoreEvent> {
        self.top_scores(&ModeFilter::All, limit).await
    }

    /// A user's personal bests, optionally within one mode.
    pub async fn user_scores(&self, user_id: &str, filter: &ModeFilter) -> Vec<ScoreEvent> {
        let mut query = Query::new(Stream::Scores)
            .user(user_id)
            .order(Order::HighestScore)
            .limit(DEFAULT_TOP_SCORES);
        if let Some(mode) = filter.mode() {
            query = query.game_mode(mode);
        }
        scores(self.store.query_or_empty(query).await)
    }

    pub async fn rankings(&self, filter: &ModeFilter) -> Vec<RankingRow> {
        let events = scores(
            self.store
                .query_or_empty(ranking_query(filter).order(Order::OldestFirst))
                .await,
        );
        rank(&events, filter)
    }

    /// Live leaderboard, recomputed from the full score stream on every new
    /// score event in scope.
    pub async fn subscribe_rankings(&self, filter: ModeFilter) -> Subscription<RankingRow> {
        let query = ranking_query(&filter);
        self.subscriptions
            .subscribe_with(query, move |records| rank(&scores(records), &filter))
            .await
    }
}

fn ranking_query(filter: &ModeFilter) -> Query {
    let query = Query::new(Stream::Scores);
    match filter.mode() {
        Some(mode) => query.game_mode(mode),
        None => query,
    }
}

fn scores(records: Vec<Record>) -> Vec<ScoreEvent> {
    records.into_iter().filter_map(Record::into_score).collect()
}
