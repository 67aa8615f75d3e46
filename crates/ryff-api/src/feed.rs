use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;

use ryff_types::api::{NearbyQuery, TrendingQuery, split_tags};
use ryff_types::feed::{DEFAULT_PAGE_LIMIT, Page, TimeWindow};
use ryff_types::models::Point;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::run_blocking;

/// Largest page a client may ask for.
pub const MAX_PAGE_LIMIT: u32 = 100;

fn page_from(page: Option<i64>, limit: Option<i64>) -> Page {
    let mut page = Page::coerce(
        page.unwrap_or(1),
        limit.unwrap_or(i64::from(DEFAULT_PAGE_LIMIT)),
    );
    page.limit = page.limit.min(MAX_PAGE_LIMIT);
    page
}

/// Coordinates from the query string. Both or neither must be given, and
/// both must be finite.
fn given_location(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Point>, ApiError> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => {
            let point = Point::new(lat, lon);
            if !point.is_finite() {
                return Err(ApiError::bad_request("Invalid location."));
            }
            Ok(Some(point))
        }
        _ => Err(ApiError::bad_request("No location given.")),
    }
}

/// GET /users/nearby: users closest to the given coordinates, or to the
/// caller's own latest location when none are given. Never includes the
/// caller.
pub async fn nearby(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<NearbyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = split_tags(query.tags.as_deref());
    let page = page_from(query.page, query.limit);
    let given = given_location(query.latitude, query.longitude)?;
    let caller = current.id;

    let users = run_blocking(&state, move |db| {
        let location = match given {
            Some(point) => point,
            None => db
                .get_latest_location(caller)?
                .map(|l| Point::new(l.latitude, l.longitude))
                .ok_or_else(|| ApiError::bad_request("No location given."))?,
        };

        db.search_nearby(location, &tags, page, Some(caller))
            .map_err(|e| ApiError::internal("Could not get nearby users.", e))
    })
    .await?;

    Ok(Json(json!({ "success": "Retrieved nearby users.", "users": users })))
}

/// GET /users/trending: users with the most upvotes in `time`
/// (`day`, `week`, `month`, `all`; default `week`).
pub async fn trending(
    State(state): State<AppState>,
    Extension(_current): Extension<CurrentUser>,
    Query(query): Query<TrendingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = split_tags(query.tags.as_deref());
    let page = page_from(query.page, query.limit);
    let window = query
        .time
        .as_deref()
        .map(TimeWindow::parse_lenient)
        .unwrap_or_default();
    let now = chrono::Utc::now();

    let users = run_blocking(&state, move |db| {
        db.search_trending(window, &tags, page, now)
            .map_err(|e| ApiError::internal("Could not get trending users.", e))
    })
    .await?;

    Ok(Json(json!({ "success": "Retrieved trending users.", "users": users })))
}
