//! User feeds: nearest users by last known location, and users ranked by
//! karma (upvotes received on their posts) within a time window.
//!
//! Each search is a single read-only statement. Every caller-supplied value
//! is bound as a parameter; only `?N` placeholder lists are generated.
//! Rows that cannot be turned into a `User` are skipped, while a failing
//! statement fails the whole search.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::{debug, warn};

use ryff_types::feed::{Page, TimeWindow};
use ryff_types::models::{Point, User};

use crate::Database;
use crate::mapping::user_from_row;

impl Database {
    /// Active users ordered by planar distance between their most recent
    /// location and `location`, nearest first. Users with no location are
    /// never returned. With `tags`, only users holding at least one of them
    /// qualify.
    pub fn search_nearby(
        &self,
        location: Point,
        tags: &[String],
        page: Page,
        exclude_user_id: Option<i64>,
    ) -> Result<Vec<User>> {
        // SQLite binds NaN as NULL, which would void the distance ordering.
        anyhow::ensure!(
            location.is_finite(),
            "Nearby search location is not finite: ({}, {})",
            location.latitude,
            location.longitude
        );

        let mut binds = Binds::default();
        let lat = binds.push(location.latitude);
        let lon = binds.push(location.longitude);
        let excluded = binds.push(exclude_user_id.map_or(Value::Null, Value::Integer));
        let tag_filter = tag_filter(&mut binds, tags);
        let (limit, offset) = binds.page(page);

        // Squared distance orders the same as the euclidean one.
        let sql = format!(
            "SELECT u.user_id, u.name, u.username, u.email, u.bio, u.date_created
             FROM users AS u
             JOIN locations AS l ON l.user_id = u.user_id
             WHERE u.active = 1
               AND l.location_id = (
                   SELECT l2.location_id FROM locations AS l2
                   WHERE l2.user_id = u.user_id
                   ORDER BY l2.date_created DESC, l2.location_id DESC
                   LIMIT 1
               )
               AND ({excluded} IS NULL OR u.user_id != {excluded})
               {tag_filter}
             ORDER BY (l.latitude - {lat}) * (l.latitude - {lat})
                    + (l.longitude - {lon}) * (l.longitude - {lon}) ASC,
                      u.user_id ASC
             LIMIT {limit} OFFSET {offset}"
        );

        let users = self.with_conn(|conn| collect_users(conn, &sql, binds))?;
        debug!(
            "Nearby search at ({}, {}) page {} returned {} users",
            location.latitude,
            location.longitude,
            page.page,
            users.len()
        );
        Ok(users)
    }

    /// Active users ordered by the number of upvotes their posts received at
    /// or after `window.lower_bound(now)`, most upvoted first. Users with no
    /// upvotes rank last with a count of zero.
    pub fn search_trending(
        &self,
        window: TimeWindow,
        tags: &[String],
        page: Page,
        now: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        let mut binds = Binds::default();
        let from_date = binds.push(window.from_date(now));
        let tag_filter = tag_filter(&mut binds, tags);
        let (limit, offset) = binds.page(page);

        let sql = format!(
            "SELECT u.user_id, u.name, u.username, u.email, u.bio, u.date_created,
                    (SELECT COUNT(*) FROM upvotes AS up
                     JOIN posts AS p ON p.post_id = up.post_id
                     WHERE p.user_id = u.user_id
                       AND up.date_created >= {from_date}) AS num_upvotes
             FROM users AS u
             WHERE u.active = 1
               {tag_filter}
             ORDER BY num_upvotes DESC, u.user_id ASC
             LIMIT {limit} OFFSET {offset}"
        );

        let users = self.with_conn(|conn| collect_users(conn, &sql, binds))?;
        debug!(
            "Trending search ({:?}) page {} returned {} users",
            window,
            page.page,
            users.len()
        );
        Ok(users)
    }
}

/// Positional parameters for a generated statement.
#[derive(Default)]
struct Binds {
    values: Vec<Value>,
}

impl Binds {
    /// Appends a value and returns its placeholder.
    fn push(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("?{}", self.values.len())
    }

    fn page(&mut self, page: Page) -> (String, String) {
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        (self.push(i64::from(page.limit)), self.push(offset))
    }
}

fn tag_filter(binds: &mut Binds, tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }

    let placeholders: Vec<String> = tags.iter().map(|tag| binds.push(tag.clone())).collect();
    format!(
        "AND EXISTS (SELECT 1 FROM user_tags AS t
                     WHERE t.user_id = u.user_id AND t.tag IN ({}))",
        placeholders.join(", ")
    )
}

fn collect_users(conn: &Connection, sql: &str, binds: Binds) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.values), |row| {
            Ok(user_from_row(row))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let total = rows.len();
    let users: Vec<User> = rows.into_iter().flatten().collect();
    if users.len() < total {
        warn!("Dropped {} unreadable user rows from feed", total - users.len());
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn ids(users: &[User]) -> Vec<i64> {
        users.iter().map(|u| u.id).collect()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    const T0: &str = "2024-06-01 00:00:00";

    #[test]
    fn nearby_orders_by_distance_and_excludes_caller() {
        let db = Database::open_in_memory().unwrap();
        let far = seed_user(&db, "far");
        let caller = seed_user(&db, "caller");
        let near = seed_user(&db, "near");
        let mid = seed_user(&db, "mid");
        seed_location(&db, far, 3.0, 0.0, T0);
        seed_location(&db, caller, 0.0, 0.5, T0);
        seed_location(&db, near, 1.0, 0.0, T0);
        seed_location(&db, mid, 0.0, -2.0, T0);

        let users = db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), Some(caller))
            .unwrap();
        assert_eq!(ids(&users), vec![near, mid, far]);

        let all = db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), None)
            .unwrap();
        assert_eq!(ids(&all), vec![caller, near, mid, far]);
    }

    #[test]
    fn nearby_distances_never_decrease() {
        let db = Database::open_in_memory().unwrap();
        let origin = Point::new(2.0, -1.0);
        let spots = [
            Point::new(9.0, 9.0),
            Point::new(2.5, -1.0),
            Point::new(-3.0, 4.0),
            Point::new(1.0, 1.0),
            Point::new(-6.0, -7.0),
            Point::new(2.0, -1.0),
        ];
        let mut placed = std::collections::HashMap::new();
        for (i, spot) in spots.iter().enumerate() {
            let id = seed_user(&db, &format!("user{i}"));
            seed_location(&db, id, spot.latitude, spot.longitude, T0);
            placed.insert(id, *spot);
        }

        let users = db.search_nearby(origin, &[], Page::default(), None).unwrap();
        assert_eq!(users.len(), spots.len());
        let distances: Vec<f64> = users
            .iter()
            .map(|u| placed[&u.id].distance_to(&origin))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]), "{distances:?}");
    }

    #[test]
    fn nearby_rejects_non_finite_location() {
        let db = Database::open_in_memory().unwrap();
        let near = seed_user(&db, "near");
        let far = seed_user(&db, "far");
        seed_location(&db, near, 1.0, 1.0, T0);
        seed_location(&db, far, 9.0, 9.0, T0);

        for location in [
            Point::new(f64::NAN, 0.0),
            Point::new(f64::INFINITY, 0.0),
            Point::new(0.0, f64::NEG_INFINITY),
        ] {
            assert!(db
                .search_nearby(location, &[], Page::default(), None)
                .is_err());
        }
    }

    #[test]
    fn nearby_uses_only_latest_location() {
        let db = Database::open_in_memory().unwrap();
        let mover = seed_user(&db, "mover");
        let stayer = seed_user(&db, "stayer");
        seed_location(&db, mover, 0.1, 0.1, "2024-01-01 00:00:00");
        seed_location(&db, mover, 50.0, 50.0, "2024-05-01 00:00:00");
        seed_location(&db, mover, 0.2, 0.2, "2023-01-01 00:00:00");
        seed_location(&db, stayer, 5.0, 5.0, T0);

        let users = db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), None)
            .unwrap();
        assert_eq!(ids(&users), vec![stayer, mover]);
    }

    #[test]
    fn nearby_skips_users_without_location_and_inactive_users() {
        let db = Database::open_in_memory().unwrap();
        let placed = seed_user(&db, "placed");
        let gone = seed_user(&db, "gone");
        seed_user(&db, "nowhere");
        seed_location(&db, placed, 2.0, 2.0, T0);
        seed_location(&db, gone, 1.0, 1.0, T0);
        db.deactivate_user(gone).unwrap();

        let users = db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), None)
            .unwrap();
        assert_eq!(ids(&users), vec![placed]);
    }

    #[test]
    fn nearby_tag_filter_matches_any_tag_once() {
        let db = Database::open_in_memory().unwrap();
        let both = seed_user(&db, "both");
        let rock = seed_user(&db, "rock");
        let none = seed_user(&db, "none");
        for (id, d) in [(both, 1.0), (rock, 2.0), (none, 0.5)] {
            seed_location(&db, id, d, 0.0, T0);
        }
        seed_tag(&db, both, "rock");
        seed_tag(&db, both, "jazz");
        seed_tag(&db, rock, "rock");
        seed_tag(&db, none, "polka");

        let users = db
            .search_nearby(
                Point::new(0.0, 0.0),
                &tags(&["rock", "jazz"]),
                Page::default(),
                None,
            )
            .unwrap();
        assert_eq!(ids(&users), vec![both, rock]);
    }

    #[test]
    fn unheld_tag_yields_empty_list() {
        let db = Database::open_in_memory().unwrap();
        let caller = seed_user(&db, "caller");
        let other = seed_user(&db, "other");
        seed_location(&db, caller, 0.0, 0.0, T0);
        seed_location(&db, other, 1.0, 0.0, T0);
        seed_tag(&db, caller, "ska");

        let nearby = db
            .search_nearby(Point::new(0.0, 0.0), &tags(&["ska"]), Page::default(), Some(caller))
            .unwrap();
        assert!(nearby.is_empty());

        let trending = db
            .search_trending(TimeWindow::All, &tags(&["bluegrass"]), Page::default(), now())
            .unwrap();
        assert!(trending.is_empty());
    }

    #[test]
    fn nearby_pages_are_contiguous() {
        let db = Database::open_in_memory().unwrap();
        let mut expected = Vec::new();
        for i in 0..5 {
            let id = seed_user(&db, &format!("user{i}"));
            seed_location(&db, id, f64::from(i) + 1.0, 0.0, T0);
            expected.push(id);
        }

        let origin = Point::new(0.0, 0.0);
        let mut paged = Vec::new();
        for page in 1..=3 {
            let users = db
                .search_nearby(origin, &[], Page::new(page, 2), None)
                .unwrap();
            paged.extend(ids(&users));
        }
        assert_eq!(paged, expected);

        let beyond = db.search_nearby(origin, &[], Page::new(4, 2), None).unwrap();
        assert!(beyond.is_empty());
        let first = db.search_nearby(origin, &[], Page::new(0, 2), None).unwrap();
        assert_eq!(ids(&first), expected[..2].to_vec());
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let db = Database::open_in_memory().unwrap();
        let good = seed_user(&db, "good");
        let broken = seed_user_created(&db, "broken", "not a date");
        seed_location(&db, good, 2.0, 0.0, T0);
        seed_location(&db, broken, 1.0, 0.0, T0);

        let users = db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), None)
            .unwrap();
        assert_eq!(ids(&users), vec![good]);

        let trending = db
            .search_trending(TimeWindow::All, &[], Page::default(), now())
            .unwrap();
        assert_eq!(ids(&trending), vec![good]);
    }

    #[test]
    fn query_failure_is_an_error_not_an_empty_list() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE locations; DROP TABLE upvotes;")?;
            Ok(())
        })
        .unwrap();

        assert!(db
            .search_nearby(Point::new(0.0, 0.0), &[], Page::default(), None)
            .is_err());
        assert!(db
            .search_trending(TimeWindow::Week, &[], Page::default(), now())
            .is_err());
    }

    #[test]
    fn trending_week_top_two() {
        let db = Database::open_in_memory().unwrap();
        let three = seed_user(&db, "three");
        let one = seed_user(&db, "one");
        let five = seed_user(&db, "five");
        for (id, votes) in [(three, 3), (one, 1), (five, 5)] {
            let post = seed_post(&db, id);
            seed_upvotes(&db, post, votes, "2024-06-14 08:00:00");
        }

        let users = db
            .search_trending(TimeWindow::Week, &[], Page::new(1, 2), now())
            .unwrap();
        assert_eq!(ids(&users), vec![five, three]);

        let rest = db
            .search_trending(TimeWindow::Week, &[], Page::new(2, 2), now())
            .unwrap();
        assert_eq!(ids(&rest), vec![one]);
    }

    #[test]
    fn trending_sums_upvotes_across_posts_within_window() {
        let db = Database::open_in_memory().unwrap();
        let steady = seed_user(&db, "steady");
        let veteran = seed_user(&db, "veteran");

        // steady: 2 + 2 recent upvotes over two posts
        for _ in 0..2 {
            let post = seed_post(&db, steady);
            seed_upvotes(&db, post, 2, "2024-06-15 06:00:00");
        }
        // veteran: 1 recent, 9 from last year
        let post = seed_post(&db, veteran);
        seed_upvotes(&db, post, 1, "2024-06-15 06:00:00");
        seed_upvotes(&db, post, 9, "2023-06-01 00:00:00");

        let day = db
            .search_trending(TimeWindow::Day, &[], Page::default(), now())
            .unwrap();
        assert_eq!(ids(&day), vec![steady, veteran]);

        let all = db
            .search_trending(TimeWindow::All, &[], Page::default(), now())
            .unwrap();
        assert_eq!(ids(&all), vec![veteran, steady]);

        let unknown = db
            .search_trending(TimeWindow::parse_lenient("decade"), &[], Page::default(), now())
            .unwrap();
        assert_eq!(ids(&unknown), ids(&all));
    }

    #[test]
    fn trending_counts_upvotes_on_window_boundary() {
        let db = Database::open_in_memory().unwrap();
        let edge = seed_user(&db, "edge");
        let quiet = seed_user(&db, "quiet");
        let post = seed_post(&db, edge);
        seed_upvotes(&db, post, 1, "2024-06-14 12:00:00");

        let users = db
            .search_trending(TimeWindow::Day, &[], Page::default(), now())
            .unwrap();
        assert_eq!(ids(&users), vec![edge, quiet]);
    }

    #[test]
    fn trending_with_tags() {
        let db = Database::open_in_memory().unwrap();
        let popular = seed_user(&db, "popular");
        let tagged = seed_user(&db, "tagged");
        let also = seed_user(&db, "also");
        seed_tag(&db, tagged, "drums");
        seed_tag(&db, also, "drums");
        seed_tag(&db, also, "bass");

        let post = seed_post(&db, popular);
        seed_upvotes(&db, post, 4, "2024-06-10 00:00:00");
        let post = seed_post(&db, also);
        seed_upvotes(&db, post, 2, "2024-06-10 00:00:00");

        let users = db
            .search_trending(TimeWindow::Month, &tags(&["drums", "bass"]), Page::default(), now())
            .unwrap();
        assert_eq!(ids(&users), vec![also, tagged]);
    }
}
