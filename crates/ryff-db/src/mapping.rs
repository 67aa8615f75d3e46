use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use tracing::warn;

use ryff_types::feed::TIMESTAMP_FORMAT;
use ryff_types::models::User;

use crate::models::UserRow;

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

/// Builds a `User` from a result row carrying the public user columns.
/// Returns `None` for a row that cannot make a valid user (NULL or
/// mistyped columns, unparsable `date_created`).
pub fn user_from_row(row: &Row<'_>) -> Option<User> {
    let user = (|| -> rusqlite::Result<_> {
        Ok((
            row.get::<_, i64>("user_id")?,
            row.get::<_, String>("name")?,
            row.get::<_, String>("username")?,
            row.get::<_, String>("email")?,
            row.get::<_, Option<String>>("bio")?,
            row.get::<_, String>("date_created")?,
        ))
    })();

    let (id, name, username, email, bio, date_created) = match user {
        Ok(cols) => cols,
        Err(e) => {
            warn!("Skipping malformed user row: {}", e);
            return None;
        }
    };

    let Some(date_created) = parse_timestamp(&date_created) else {
        warn!("Skipping user {}: corrupt date_created '{}'", id, date_created);
        return None;
    };

    Some(User {
        id,
        name,
        username,
        email,
        bio: bio.unwrap_or_default(),
        date_created,
    })
}

impl UserRow {
    /// Public view of the row; `None` if the stored timestamp is corrupt.
    pub fn to_user(&self) -> Option<User> {
        let date_created = parse_timestamp(&self.date_created)?;
        Some(User {
            id: self.user_id,
            name: self.name.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            bio: self.bio.clone(),
            date_created,
        })
    }
}
