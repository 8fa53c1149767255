use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Event store: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE global_messages (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                nickname    TEXT NOT NULL,
                avatar_url  TEXT NOT NULL,
                text        TEXT NOT NULL,
                ts          INTEGER NOT NULL
            );

            CREATE INDEX idx_global_ts ON global_messages(ts);

            CREATE TABLE direct_messages (
                id               TEXT PRIMARY KEY,
                from_user_id     TEXT NOT NULL,
                from_nickname    TEXT NOT NULL,
                from_avatar_url  TEXT NOT NULL,
                to_user_id       TEXT NOT NULL,
                to_nickname      TEXT NOT NULL,
                text             TEXT NOT NULL,
                pair_key         TEXT NOT NULL,
                ts               INTEGER NOT NULL
            );

            CREATE INDEX idx_direct_ts ON direct_messages(ts);
            CREATE INDEX idx_direct_pair ON direct_messages(pair_key, ts);
            CREATE INDEX idx_direct_from ON direct_messages(from_user_id, ts);

            CREATE TABLE score_events (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                user_name   TEXT NOT NULL,
                game_mode   TEXT NOT NULL,
                score       INTEGER NOT NULL,
                metadata    TEXT NOT NULL DEFAULT '{}',
                ts          INTEGER NOT NULL
            );

            CREATE INDEX idx_scores_ts ON score_events(ts);
            CREATE INDEX idx_scores_mode ON score_events(game_mode, score);
            CREATE INDEX idx_scores_user ON score_events(user_id, score);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Event store migrations complete");
    Ok(())
}
