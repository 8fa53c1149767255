use std::collections::HashMap;

use rivalis_types::models::{Message, RankingRow, Record, ScoreEvent};

/// Identity of an item inside a window.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Record {
    fn key(&self) -> &str {
        self.id()
    }
}

impl Keyed for Message {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ScoreEvent {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for RankingRow {
    fn key(&self) -> &str {
        &self.user_id
    }
}

/// What changed between two consecutive windows.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDiff<T> {
    /// New items, in `next` order.
    pub added: Vec<T>,
    /// Items present in both windows whose contents differ, in `next` order.
    pub changed: Vec<T>,
    /// Keys present only in the previous window.
    pub removed: Vec<String>,
}

impl<T> WindowDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

pub fn diff<T: Keyed + PartialEq + Clone>(previous: &[T], next: &[T]) -> WindowDiff<T> {
    let before: HashMap<&str, &T> = previous.iter().map(|item| (item.key(), item)).collect();
    let after: HashMap<&str, &T> = next.iter().map(|item| (item.key(), item)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for item in next {
        match before.get(item.key()) {
            None => added.push(item.clone()),
            Some(old) if *old != item => changed.push(item.clone()),
            Some(_) => {}
        }
    }

    let removed = previous
        .iter()
        .filter(|item| !after.contains_key(item.key()))
        .map(|item| item.key().to_string())
        .collect();

    WindowDiff { added, changed, removed }
}
