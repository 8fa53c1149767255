use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rivalis_types::models::{
    Author, ChannelKind, Message, NewRecord, Recipient, Record, ScoreEvent, Stream,
};
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use crate::Database;
use crate::error::StoreError;
use crate::query::{Query, table_for};

const GLOBAL_COLUMNS: &str = "id, user_id, nickname, avatar_url, text, ts";
const DIRECT_COLUMNS: &str =
    "id, from_user_id, from_nickname, from_avatar_url, to_user_id, to_nickname, text, ts";
const SCORE_COLUMNS: &str = "id, user_id, user_name, game_mode, score, metadata, ts";

impl Database {
    /// Persist a new record. The store assigns the id and a timestamp that is
    /// strictly greater than every timestamp already in the same stream.
    pub fn append(&self, record: &NewRecord) -> Result<Record, StoreError> {
        let stream = record.stream();
        self.with_conn_mut(|conn| insert_record(conn, record))
            .map_err(|e| StoreError::write(stream, e))
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.with_conn(|conn| select_records(conn, query))
            .map_err(|e| StoreError::read(query.stream, e))
    }

    /// Remove records by id. Only the global stream accepts deletes; direct
    /// messages and score events are kept forever.
    pub fn delete(&self, stream: Stream, ids: &[String]) -> Result<usize, StoreError> {
        if !stream.is_trimmable() {
            return Err(StoreError::write(stream, "stream is append-only"));
        }
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt =
                    tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", table_for(stream)))?;
                for id in ids {
                    removed += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .map_err(|e| StoreError::write(stream, e))
    }
}

fn insert_record(conn: &mut Connection, record: &NewRecord) -> Result<Record> {
    let tx = conn.transaction()?;
    let timestamp = next_timestamp(&tx, record.stream())?;
    let id = Uuid::new_v4().to_string();
    let ts = timestamp.timestamp_micros();

    let stored = match record {
        NewRecord::Global(msg) => {
            tx.execute(
                "INSERT INTO global_messages (id, user_id, nickname, avatar_url, text, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id,
                    msg.author.user_id,
                    msg.author.nickname,
                    msg.author.avatar_url,
                    msg.text,
                    ts
                ],
            )?;
            Record::Message(Message {
                id,
                channel: ChannelKind::Global,
                author: msg.author.clone(),
                recipient: None,
                text: msg.text.clone(),
                timestamp,
            })
        }
        NewRecord::Direct(msg) => {
            let message = Message {
                id,
                channel: ChannelKind::Direct,
                author: msg.author.clone(),
                recipient: Some(msg.recipient.clone()),
                text: msg.text.clone(),
                timestamp,
            };
            // The pair key is written in the same row as the raw message, so
            // the per-pair index can never disagree with the stream.
            let pair_key = message
                .conversation()
                .map(|key| key.storage_key())
                .unwrap_or_default();
            tx.execute(
                "INSERT INTO direct_messages
                    (id, from_user_id, from_nickname, from_avatar_url, to_user_id, to_nickname, text, pair_key, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    message.id,
                    msg.author.user_id,
                    msg.author.nickname,
                    msg.author.avatar_url,
                    msg.recipient.user_id,
                    msg.recipient.nickname,
                    msg.text,
                    pair_key,
                    ts
                ],
            )?;
            Record::Message(message)
        }
        NewRecord::Score(score) => {
            let metadata = serde_json::to_string(&score.metadata)?;
            tx.execute(
                "INSERT INTO score_events (id, user_id, user_name, game_mode, score, metadata, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    score.user_id,
                    score.user_name,
                    score.game_mode,
                    score.score,
                    metadata,
                    ts
                ],
            )?;
            Record::Score(ScoreEvent {
                id,
                user_id: score.user_id.clone(),
                user_name: score.user_name.clone(),
                game_mode: score.game_mode.clone(),
                score: score.score,
                metadata: score.metadata.clone(),
                timestamp,
            })
        }
    };

    tx.commit()?;
    Ok(stored)
}

/// Wall clock, bumped past the newest timestamp already in the stream.
fn next_timestamp(conn: &Connection, stream: Stream) -> Result<DateTime<Utc>> {
    let last: Option<i64> = conn.query_row(
        &format!("SELECT MAX(ts) FROM {}", table_for(stream)),
        [],
        |row| row.get(0),
    )?;

    let now = Utc::now().timestamp_micros();
    let ts = match last {
        Some(last) if last >= now => last + 1,
        _ => now,
    };

    DateTime::<Utc>::from_timestamp_micros(ts).ok_or_else(|| anyhow!("timestamp out of range: {}", ts))
}

fn select_records(conn: &Connection, query: &Query) -> Result<Vec<Record>> {
    let plan = query.plan()?;
    let (columns, from_row): (&str, fn(&Row<'_>) -> rusqlite::Result<Record>) = match query.stream {
        Stream::Global => (GLOBAL_COLUMNS, global_from_row),
        Stream::Direct => (DIRECT_COLUMNS, direct_from_row),
        Stream::Scores => (SCORE_COLUMNS, score_from_row),
    };
    let sql = format!("SELECT {} FROM {}{}", columns, plan.table, plan.tail);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(plan.params.iter()), from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn global_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let timestamp = timestamp_from_micros(&id, row.get(5)?);
    Ok(Record::Message(Message {
        channel: ChannelKind::Global,
        author: Author {
            user_id: row.get(1)?,
            nickname: row.get(2)?,
            avatar_url: row.get(3)?,
        },
        recipient: None,
        text: row.get(4)?,
        timestamp,
        id,
    }))
}

fn direct_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let timestamp = timestamp_from_micros(&id, row.get(7)?);
    Ok(Record::Message(Message {
        channel: ChannelKind::Direct,
        author: Author {
            user_id: row.get(1)?,
            nickname: row.get(2)?,
            avatar_url: row.get(3)?,
        },
        recipient: Some(Recipient {
            user_id: row.get(4)?,
            nickname: row.get(5)?,
        }),
        text: row.get(6)?,
        timestamp,
        id,
    }))
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let raw_metadata: String = row.get(5)?;
    let metadata = serde_json::from_str(&raw_metadata).unwrap_or_else(|e| {
        warn!("Corrupt metadata on score event '{}': {}", id, e);
        serde_json::Value::Null
    });
    let timestamp = timestamp_from_micros(&id, row.get(6)?);
    Ok(Record::Score(ScoreEvent {
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        game_mode: row.get(3)?,
        score: row.get(4)?,
        metadata,
        timestamp,
        id,
    }))
}

fn timestamp_from_micros(id: &str, micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(|| {
        warn!("Corrupt timestamp {} on record '{}'", micros, id);
        DateTime::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Order;
    use rivalis_types::models::{
        ConversationKey, NewDirectMessage, NewGlobalMessage, NewScoreEvent,
    };
    use std::path::PathBuf;

    fn temp_db() -> (Database, PathBuf) {
        let path = std::env::temp_dir().join(format!("rivalis_db_test_{}.db", Uuid::new_v4()));
        (Database::open(&path).unwrap(), path)
    }

    fn author(id: &str) -> Author {
        Author {
            user_id: id.to_string(),
            nickname: format!("{}_nick", id),
            avatar_url: format!("https://avatars.example/{}.png", id),
        }
    }

    fn global(from: &str, text: &str) -> NewRecord {
        NewRecord::Global(NewGlobalMessage { author: author(from), text: text.to_string() })
    }

    fn direct(from: &str, to: &str, text: &str) -> NewRecord {
        NewRecord::Direct(NewDirectMessage {
            author: author(from),
            recipient: Recipient { user_id: to.to_string(), nickname: format!("{}_nick", to) },
            text: text.to_string(),
        })
    }

    fn score(user: &str, mode: &str, value: i64) -> NewRecord {
        NewRecord::Score(NewScoreEvent {
            user_id: user.to_string(),
            user_name: user.to_uppercase(),
            game_mode: mode.to_string(),
            score: value,
            metadata: serde_json::json!({ "duration": 30 }),
        })
    }

    #[test]
    fn timestamps_strictly_increase_within_a_stream() {
        let (db, path) = temp_db();
        let mut last = None;
        for i in 0..20 {
            let record = db.append(&global("a", &format!("msg {}", i))).unwrap();
            if let Some(prev) = last {
                assert!(record.timestamp() > prev);
            }
            last = Some(record.timestamp());
        }
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn query_returns_newest_first_with_limit() {
        let (db, path) = temp_db();
        for i in 0..5 {
            db.append(&global("a", &format!("msg {}", i))).unwrap();
        }

        let rows = db.query(&Query::new(Stream::Global).limit(3)).unwrap();
        let texts: Vec<String> = rows
            .into_iter()
            .filter_map(Record::into_message)
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["msg 4", "msg 3", "msg 2"]);

        let oldest = db
            .query(&Query::new(Stream::Global).order(Order::OldestFirst).limit(1))
            .unwrap();
        assert_eq!(oldest[0].clone().into_message().unwrap().text, "msg 0");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn direct_message_round_trips_sender_and_recipient_fields() {
        let (db, path) = temp_db();
        let stored = db.append(&direct("alice", "bob", "hey")).unwrap();

        let rows = db.query(&Query::new(Stream::Direct)).unwrap();
        assert_eq!(rows, vec![stored]);

        let message = rows[0].clone().into_message().unwrap();
        assert_eq!(message.channel, ChannelKind::Direct);
        assert_eq!(message.author.avatar_url, "https://avatars.example/alice.png");
        assert_eq!(message.recipient.unwrap().nickname, "bob_nick");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn pair_filter_matches_both_orientations() {
        let (db, path) = temp_db();
        db.append(&direct("alice", "bob", "1")).unwrap();
        db.append(&direct("carol", "bob", "2")).unwrap();
        db.append(&direct("bob", "alice", "3")).unwrap();

        let rows = db
            .query(&Query::new(Stream::Direct).pair(ConversationKey::new("bob", "alice")))
            .unwrap();
        let texts: Vec<String> = rows
            .into_iter()
            .filter_map(Record::into_message)
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["3", "1"]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn highest_score_order_filters_by_mode() {
        let (db, path) = temp_db();
        db.append(&score("a", "solo", 5)).unwrap();
        db.append(&score("b", "solo", 12)).unwrap();
        db.append(&score("c", "burnouts", 40)).unwrap();
        db.append(&score("d", "solo", 12)).unwrap();

        let rows = db
            .query(&Query::new(Stream::Scores).game_mode("solo").order(Order::HighestScore).limit(10))
            .unwrap();
        let users: Vec<String> = rows
            .into_iter()
            .filter_map(Record::into_score)
            .map(|s| s.user_id)
            .collect();
        // equal scores: older event first
        assert_eq!(users, vec!["b", "d", "a"]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn score_metadata_is_preserved() {
        let (db, path) = temp_db();
        db.append(&score("a", "solo", 5)).unwrap();
        let rows = db.query(&Query::new(Stream::Scores)).unwrap();
        let event = rows[0].clone().into_score().unwrap();
        assert_eq!(event.metadata, serde_json::json!({ "duration": 30 }));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn delete_only_allowed_on_global_stream() {
        let (db, path) = temp_db();
        let kept = db.append(&direct("a", "b", "keep")).unwrap();
        let err = db.delete(Stream::Direct, &[kept.id().to_string()]).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailure { stream: Stream::Direct, .. }));
        assert!(db.delete(Stream::Scores, &[]).is_err());

        let gone = db.append(&global("a", "bye")).unwrap();
        assert_eq!(db.delete(Stream::Global, &[gone.id().to_string()]).unwrap(), 1);
        assert!(db.query(&Query::new(Stream::Global)).unwrap().is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn backend_failure_surfaces_as_typed_errors() {
        let (db, path) = temp_db();
        db.with_conn_mut(|conn| {
            conn.execute_batch("DROP TABLE global_messages;")?;
            Ok(())
        })
        .unwrap();

        let err = db.append(&global("a", "lost")).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailure { stream: Stream::Global, .. }));

        let err = db.query(&Query::new(Stream::Global)).unwrap_err();
        assert!(matches!(err, StoreError::ReadFailure { stream: Stream::Global, .. }));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unsupported_filter_is_a_read_failure() {
        let (db, path) = temp_db();
        let err = db.query(&Query::new(Stream::Global).game_mode("solo")).unwrap_err();
        assert_eq!(err.stream(), Stream::Global);
        assert!(err.to_string().contains("game mode filter"));
        let _ = std::fs::remove_file(path);
    }
}
