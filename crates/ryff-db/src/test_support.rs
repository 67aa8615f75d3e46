//! Fixture helpers for the db tests. Rows are inserted with explicit
//! timestamps so windows and "latest" lookups are deterministic.

use crate::Database;

pub fn seed_user(db: &Database, username: &str) -> i64 {
    seed_user_created(db, username, "2014-01-01 00:00:00")
}

pub fn seed_user_created(db: &Database, username: &str, date_created: &str) -> i64 {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO users (name, username, email, password, date_created)
             VALUES (?1, ?1, ?2, 'x', ?3)",
            rusqlite::params![username, format!("{username}@example.com"), date_created],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .unwrap()
}

pub fn seed_location(db: &Database, user_id: i64, latitude: f64, longitude: f64, at: &str) {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO locations (user_id, latitude, longitude, date_created)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, latitude, longitude, at],
        )?;
        Ok(())
    })
    .unwrap()
}

pub fn seed_tag(db: &Database, user_id: i64, tag: &str) {
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO user_tags (user_id, tag) VALUES (?1, ?2)",
            rusqlite::params![user_id, tag],
        )?;
        Ok(())
    })
    .unwrap()
}

pub fn seed_post(db: &Database, user_id: i64) -> i64 {
    db.with_conn_mut(|conn| {
        conn.execute("INSERT INTO posts (user_id, content) VALUES (?1, 'riff')", [user_id])?;
        Ok(conn.last_insert_rowid())
    })
    .unwrap()
}

/// Adds `count` upvotes to `post_id` at `at`, each from a fresh voter account.
pub fn seed_upvotes(db: &Database, post_id: i64, count: usize, at: &str) {
    db.with_conn_mut(|conn| {
        for _ in 0..count {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            let voter = format!("voter{n}");
            conn.execute(
                "INSERT INTO users (name, username, email, password, active)
                 VALUES (?1, ?1, ?2, 'x', 0)",
                rusqlite::params![voter, format!("{voter}@example.com")],
            )?;
            let voter_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO upvotes (post_id, user_id, date_created) VALUES (?1, ?2, ?3)",
                rusqlite::params![post_id, voter_id, at],
            )?;
        }
        Ok(())
    })
    .unwrap()
}
