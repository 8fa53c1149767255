use anyhow::{Result, bail};
use rivalis_types::models::{ConversationKey, Stream};
use rusqlite::types::Value;

/// Field filters. Each field only exists on some streams; asking a stream
/// for a field it does not carry is rejected when the query is planned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Author: `user_id` on global and scores, `from_user_id` on direct.
    pub user_id: Option<String>,
    /// Direct stream only.
    pub recipient_id: Option<String>,
    /// Direct stream only, served by the per-pair index.
    pub pair: Option<ConversationKey>,
    /// Scores stream only.
    pub game_mode: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
    /// Scores stream only. Equal scores keep the older event first.
    HighestScore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub stream: Stream,
    pub filter: Filter,
    pub order: Order,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            filter: Filter::default(),
            order: Order::default(),
            limit: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.filter.user_id = Some(user_id.into());
        self
    }

    pub fn recipient(mut self, user_id: impl Into<String>) -> Self {
        self.filter.recipient_id = Some(user_id.into());
        self
    }

    pub fn pair(mut self, key: ConversationKey) -> Self {
        self.filter.pair = Some(key);
        self
    }

    pub fn game_mode(mut self, mode: impl Into<String>) -> Self {
        self.filter.game_mode = Some(mode.into());
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the SQL for this query. The column list is left to the caller.
    pub(crate) fn plan(&self) -> Result<Plan> {
        let table = table_for(self.stream);
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(user_id) = &self.filter.user_id {
            let column = match self.stream {
                Stream::Direct => "from_user_id",
                Stream::Global | Stream::Scores => "user_id",
            };
            params.push(Value::Text(user_id.clone()));
            clauses.push(format!("{} = ?{}", column, params.len()));
        }

        if let Some(recipient_id) = &self.filter.recipient_id {
            if self.stream != Stream::Direct {
                bail!("recipient filter is not supported on the {} stream", self.stream);
            }
            params.push(Value::Text(recipient_id.clone()));
            clauses.push(format!("to_user_id = ?{}", params.len()));
        }

        if let Some(pair) = &self.filter.pair {
            if self.stream != Stream::Direct {
                bail!("pair filter is not supported on the {} stream", self.stream);
            }
            params.push(Value::Text(pair.storage_key()));
            clauses.push(format!("pair_key = ?{}", params.len()));
        }

        if let Some(mode) = &self.filter.game_mode {
            if self.stream != Stream::Scores {
                bail!("game mode filter is not supported on the {} stream", self.stream);
            }
            params.push(Value::Text(mode.clone()));
            clauses.push(format!("game_mode = ?{}", params.len()));
        }

        // rowid breaks ties between records sharing a timestamp
        let order_by = match self.order {
            Order::NewestFirst => "ts DESC, rowid DESC",
            Order::OldestFirst => "ts ASC, rowid ASC",
            Order::HighestScore => {
                if self.stream != Stream::Scores {
                    bail!("score ordering is not supported on the {} stream", self.stream);
                }
                "score DESC, ts ASC, rowid ASC"
            }
        };

        let mut tail = String::new();
        if !clauses.is_empty() {
            tail.push_str(" WHERE ");
            tail.push_str(&clauses.join(" AND "));
        }
        tail.push_str(" ORDER BY ");
        tail.push_str(order_by);
        if let Some(limit) = self.limit {
            params.push(Value::Integer(i64::from(limit)));
            tail.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        Ok(Plan { table, tail, params })
    }
}

pub(crate) struct Plan {
    pub table: &'static str,
    /// Everything after `FROM <table>`.
    pub tail: String,
    pub params: Vec<Value>,
}

pub(crate) fn table_for(stream: Stream) -> &'static str {
    match stream {
        Stream::Global => "global_messages",
        Stream::Direct => "direct_messages",
        Stream::Scores => "score_events",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_filtered_window() {
        let plan = Query::new(Stream::Direct)
            .pair(ConversationKey::new("b", "a"))
            .limit(20)
            .plan()
            .unwrap();
        assert_eq!(plan.table, "direct_messages");
        assert_eq!(plan.tail, " WHERE pair_key = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2");
        assert_eq!(plan.params.len(), 2);
        assert_eq!(plan.params[0], Value::Text("1:ab".into()));
        assert_eq!(plan.params[1], Value::Integer(20));
    }

    #[test]
    fn author_filter_maps_to_stream_column() {
        let plan = Query::new(Stream::Direct).user("a").plan().unwrap();
        assert!(plan.tail.contains("from_user_id = ?1"));

        let plan = Query::new(Stream::Scores).user("a").game_mode("solo").plan().unwrap();
        assert!(plan.tail.contains("user_id = ?1 AND game_mode = ?2"));
    }

    #[test]
    fn rejects_fields_the_stream_lacks() {
        assert!(Query::new(Stream::Global).game_mode("solo").plan().is_err());
        assert!(Query::new(Stream::Scores).pair(ConversationKey::new("a", "b")).plan().is_err());
        assert!(Query::new(Stream::Global).recipient("a").plan().is_err());
        assert!(Query::new(Stream::Direct).order(Order::HighestScore).plan().is_err());
    }

    #[test]
    fn unlimited_query_has_no_limit_clause() {
        let plan = Query::new(Stream::Global).plan().unwrap();
        assert!(!plan.tail.contains("LIMIT"));
        assert!(plan.params.is_empty());
    }
}
