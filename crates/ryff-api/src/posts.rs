use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use tracing::warn;

use ryff_db::mapping::parse_timestamp;
use ryff_db::models::RiffRow;
use ryff_types::models::{Post, Riff};

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, GENERIC_ERROR};
use crate::middleware::CurrentUser;
use crate::run_blocking;

/// GET /posts/{post_id}: the post, its author and its riff, if any.
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(_current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (row, author, riff_row) = run_blocking(&state, move |db| {
        let row = db
            .get_post(post_id)?
            .ok_or_else(|| ApiError::NotFound("No post with that ID.".into()))?;
        let author = db
            .get_user_by_id(row.user_id)?
            .and_then(|u| u.to_user())
            .ok_or_else(|| ApiError::internal(GENERIC_ERROR, format!("author of post {}", post_id)))?;
        let riff = db.get_riff_by_post_id(post_id)?;
        Ok((row, author, riff))
    })
    .await?;

    let riff = match riff_row {
        Some(r) => riff_with_audio(&state, r).await,
        None => None,
    };

    let date_created = parse_timestamp(&row.date_created).ok_or_else(|| {
        ApiError::internal(GENERIC_ERROR, format!("corrupt date_created on post {}", post_id))
    })?;

    let post = Post {
        id: row.post_id,
        user: author,
        content: row.content,
        upvotes: row.upvotes,
        riff,
        date_created,
    };

    Ok(Json(json!({ "success": "Retrieved post.", "post": post })))
}

/// A riff is only reported when its audio file is on disk.
async fn riff_with_audio(state: &AppStateInner, row: RiffRow) -> Option<Riff> {
    let path = state.riff_dir.join(format!("{}.m4a", row.riff_id));
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(Riff {
            id: row.riff_id,
            title: row.title,
            duration: row.duration,
            link: riff_link(&state.site_root, row.riff_id),
        }),
        Ok(false) => {
            warn!("Riff {} of post {} has no audio at {}", row.riff_id, row.post_id, path.display());
            None
        }
        Err(e) => {
            warn!("Could not check riff audio {}: {}", path.display(), e);
            None
        }
    }
}

fn riff_link(site_root: &str, riff_id: i64) -> String {
    format!("{}/riffs/{}.m4a", site_root.trim_end_matches('/'), riff_id)
}
