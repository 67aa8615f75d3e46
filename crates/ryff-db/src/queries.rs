use crate::models::{LocationRow, PostRow, RiffRow, UserField, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use ryff_types::feed::TIMESTAMP_FORMAT;
use ryff_types::models::Point;

const USER_COLUMNS: &str =
    "user_id, name, username, email, bio, password, active, date_created";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        name: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (name, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (name, username, email, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "user_id", &user_id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", &username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", &email))
    }

    pub fn update_user_field(&self, user_id: i64, field: UserField, value: &str) -> Result<()> {
        let sql = format!("UPDATE users SET {} = ?1 WHERE user_id = ?2", field.column());
        self.with_conn_mut(|conn| {
            conn.execute(&sql, rusqlite::params![value, user_id])?;
            Ok(())
        })
    }

    /// Marks the user inactive and ends all of their sessions. The row itself
    /// is kept.
    pub fn deactivate_user(&self, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET active = 0 WHERE user_id = ?1", [user_id])?;
            conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
            Ok(())
        })
    }

    // -- Locations --

    pub fn insert_location(&self, user_id: i64, point: Point) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO locations (user_id, latitude, longitude) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, point.latitude, point.longitude],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recently created location of the user; later inserts win ties.
    pub fn get_latest_location(&self, user_id: i64) -> Result<Option<LocationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT location_id, user_id, latitude, longitude, date_created
                 FROM locations
                 WHERE user_id = ?1
                 ORDER BY date_created DESC, location_id DESC
                 LIMIT 1",
                [user_id],
                |row| {
                    Ok(LocationRow {
                        location_id: row.get(0)?,
                        user_id: row.get(1)?,
                        latitude: row.get(2)?,
                        longitude: row.get(3)?,
                        date_created: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Sessions --

    pub fn create_session(&self, session_id: &str, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![session_id, user_id],
            )?;
            Ok(())
        })
    }

    /// True when the session exists, belongs to `user_id`, and that user is
    /// still active.
    pub fn session_is_active(&self, session_id: &str, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sessions AS s
                     JOIN users AS u ON u.user_id = s.user_id
                     WHERE s.session_id = ?1 AND s.user_id = ?2 AND u.active = 1",
                    rusqlite::params![session_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns whether a session was removed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE session_id = ?1", [session_id])?;
            Ok(n > 0)
        })
    }

    /// Deletes sessions created before `created_before`. Returns how many
    /// were removed.
    pub fn prune_sessions(&self, created_before: DateTime<Utc>) -> Result<usize> {
        let cutoff = created_before.format(TIMESTAMP_FORMAT).to_string();
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE date_created < ?1", [cutoff])?;
            Ok(n)
        })
    }

    // -- Posts & riffs --

    pub fn get_post(&self, post_id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT p.post_id, p.user_id, p.content, p.date_created,
                        (SELECT COUNT(*) FROM upvotes AS up WHERE up.post_id = p.post_id)
                 FROM posts AS p
                 WHERE p.post_id = ?1",
                [post_id],
                |row| {
                    Ok(PostRow {
                        post_id: row.get(0)?,
                        user_id: row.get(1)?,
                        content: row.get(2)?,
                        date_created: row.get(3)?,
                        upvotes: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_riff_by_post_id(&self, post_id: i64) -> Result<Option<RiffRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT riff_id, post_id, title, duration FROM riffs WHERE post_id = ?1",
                [post_id],
                |row| {
                    Ok(RiffRow {
                        riff_id: row.get(0)?,
                        post_id: row.get(1)?,
                        title: row.get(2)?,
                        duration: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_user(
    conn: &Connection,
    column: &'static str,
    value: &dyn rusqlite::types::ToSql,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_row).optional()?;
    Ok(row)
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        bio: row.get(4)?,
        password: row.get(5)?,
        active: row.get(6)?,
        date_created: row.get(7)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
