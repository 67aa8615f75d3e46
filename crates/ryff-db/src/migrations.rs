use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                user_id       INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT NOT NULL DEFAULT '',
                username      TEXT NOT NULL UNIQUE,
                email         TEXT NOT NULL UNIQUE,
                bio           TEXT NOT NULL DEFAULT '',
                password      TEXT NOT NULL,
                active        INTEGER NOT NULL DEFAULT 1,
                date_created  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE locations (
                location_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                latitude      REAL NOT NULL,
                longitude     REAL NOT NULL,
                date_created  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_locations_user
                ON locations(user_id, date_created);

            CREATE TABLE user_tags (
                user_id  INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                tag      TEXT NOT NULL,
                PRIMARY KEY (user_id, tag)
            );

            CREATE INDEX idx_user_tags_tag
                ON user_tags(tag);

            CREATE TABLE posts (
                post_id       INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                content       TEXT NOT NULL DEFAULT '',
                date_created  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_posts_user
                ON posts(user_id);

            CREATE TABLE upvotes (
                upvote_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id       INTEGER NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
                user_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                date_created  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(post_id, user_id)
            );

            CREATE INDEX idx_upvotes_post
                ON upvotes(post_id, date_created);

            CREATE TABLE riffs (
                riff_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id   INTEGER NOT NULL UNIQUE REFERENCES posts(post_id) ON DELETE CASCADE,
                title     TEXT NOT NULL,
                duration  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE sessions (
                session_id    TEXT PRIMARY KEY,
                user_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                date_created  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
