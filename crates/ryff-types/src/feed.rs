use chrono::{DateTime, Duration, Utc};

/// Storage format for every timestamp column (SQLite `datetime('now')`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_PAGE_LIMIT: u32 = 15;

/// Time range over which trending karma is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl TimeWindow {
    /// Parses a window name. Anything unrecognised counts from the beginning
    /// of time, same as `all`.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "day" => Self::Day,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::All,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Day => Some(Duration::hours(24)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
            Self::All => None,
        }
    }

    /// Earliest instant counted by this window, relative to `now`.
    pub fn lower_bound(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.duration() {
            Some(window) => now - window,
            None => DateTime::<Utc>::default(),
        }
    }

    /// `lower_bound` rendered in the storage timestamp format.
    pub fn from_date(&self, now: DateTime<Utc>) -> String {
        self.lower_bound(now).format(TIMESTAMP_FORMAT).to_string()
    }
}

/// 1-based page of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Builds a page from raw request values; negatives coerce to zero.
    pub fn coerce(page: i64, limit: i64) -> Self {
        let clamp = |v: i64| v.clamp(0, u32::MAX as i64) as u32;
        Self::new(clamp(page), clamp(limit))
    }

    /// Page 0 is read as page 1, so the offset is never negative.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}
