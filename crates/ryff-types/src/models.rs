use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub date_created: DateTime<Utc>,
}

/// A latitude/longitude pair. Distances between points are planar, in raw
/// coordinate units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.latitude - other.latitude;
        let dy = self.longitude - other.longitude;
        (dx * dx + dy * dy).sqrt()
    }

    /// False when either coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Audio attachment of a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Riff {
    pub id: i64,
    pub title: String,
    pub duration: i64,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user: User,
    pub content: String,
    pub upvotes: i64,
    pub riff: Option<Riff>,
    pub date_created: DateTime<Utc>,
}
