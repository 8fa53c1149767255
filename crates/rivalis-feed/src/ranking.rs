use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

use rivalis_types::models::{RankingRow, ScoreEvent};

/// Which game modes count towards a ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModeFilter {
    #[default]
    All,
    Only(String),
}

impl ModeFilter {
    pub fn from_option(mode: Option<&str>) -> Self {
        mode.map(|m| m.parse().unwrap_or_default()).unwrap_or_default()
    }

    pub fn accepts(&self, mode: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == mode,
        }
    }

    /// Mode to push down to the store query, if any.
    pub fn mode(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Only(mode) => Some(mode),
        }
    }
}

impl FromStr for ModeFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::Only(s.to_string()))
        }
    }
}

/// Aggregate raw score events into leaderboard rows, highest total first.
///
/// Rows with equal totals keep the order in which their users were first
/// seen in `events`. Fed an ascending window, that means the user whose
/// oldest qualifying event came first ranks higher. The displayed name is
/// the one on the user's last event. Totals saturate at the `i64` bounds.
pub fn rank<'a>(
    events: impl IntoIterator<Item = &'a ScoreEvent>,
    filter: &ModeFilter,
) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for event in events {
        if !filter.accepts(&event.game_mode) {
            continue;
        }

        let slot = *index.entry(event.user_id.as_str()).or_insert_with(|| {
            rows.push(RankingRow {
                user_id: event.user_id.clone(),
                user_name: event.user_name.clone(),
                total: 0,
                by_mode: Default::default(),
            });
            rows.len() - 1
        });

        let row = &mut rows[slot];
        row.user_name.clone_from(&event.user_name);
        row.total = row.total.saturating_add(event.score);
        let subtotal = row.by_mode.entry(event.game_mode.clone()).or_insert(0);
        *subtotal = subtotal.saturating_add(event.score);
    }

    // sort_by is stable, which is what keeps first-seen order among ties
    rows.sort_by(|a, b| b.total.cmp(&a.total));
    rows
}
