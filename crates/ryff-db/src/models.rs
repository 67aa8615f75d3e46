/// Database row types: these map directly to SQLite rows.
/// Distinct from ryff-types models to keep the DB layer independent.

/// Full `users` row, including the password hash. Never serialized.
pub struct UserRow {
    pub user_id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub password: String,
    pub active: bool,
    pub date_created: String,
}

pub struct LocationRow {
    pub location_id: i64,
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub date_created: String,
}

pub struct PostRow {
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub upvotes: i64,
    pub date_created: String,
}

pub struct RiffRow {
    pub riff_id: i64,
    pub post_id: i64,
    pub title: String,
    pub duration: i64,
}

/// Profile columns that can be changed one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Name,
    Username,
    Email,
    Bio,
    Password,
}

impl UserField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Username => "username",
            Self::Email => "email",
            Self::Bio => "bio",
            Self::Password => "password",
        }
    }
}
