use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::{debug, info};

use ryff_db::Database;
use ryff_db::models::UserField;
use ryff_types::models::{Point, User};

use crate::auth::{
    AppState, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_USERNAME_LEN, clear_session_cookies, hash_password,
};
use crate::error::{ApiError, GENERIC_ERROR};
use crate::middleware::CurrentUser;
use crate::run_blocking;

pub const MAX_BIO_BYTES: usize = 65535;

/// Fields accepted by update-user. Everything is optional.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub password: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub avatar: Option<Avatar>,
}

#[derive(Debug)]
pub struct Avatar {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// POST /update-user: multipart form, see `UserUpdate`. Returns the updated
/// user.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut update = UserUpdate::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "avatar" {
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::bad_request("Unable to upload avatar."))?;
            update.avatar = Some(Avatar {
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
        let slot = match name.as_str() {
            "name" => &mut update.name,
            "username" => &mut update.username,
            "email" => &mut update.email,
            "bio" => &mut update.bio,
            "password" => &mut update.password,
            "latitude" => &mut update.latitude,
            "longitude" => &mut update.longitude,
            other => {
                debug!("Ignoring unknown update-user field '{}'", other);
                continue;
            }
        };
        *slot = Some(value);
    }

    let user_id = current.id;
    let avatar = update.avatar.take();
    let location = parse_location(update.latitude.as_deref(), update.longitude.as_deref());

    run_blocking(&state, move |db| apply_profile_update(db, user_id, &update)).await?;

    if let Some(avatar) = avatar {
        save_avatar(&state, user_id, avatar).await?;
    }

    let user = run_blocking(&state, move |db| {
        if let Some(point) = location {
            db.insert_location(user_id, point)
                .map_err(|e| ApiError::internal("Could not update location.", e))?;
        }
        fetch_user(db, user_id)
    })
    .await?;

    info!("User {} updated their profile", user_id);

    Ok(Json(json!({ "success": "Successfully updated.", "user": user })))
}

/// Applies the text fields of `update` in order; the first failure stops the
/// update with a message naming the field. Empty values are ignored, except
/// for `bio`, which may be cleared.
pub fn apply_profile_update(
    db: &Database,
    user_id: i64,
    update: &UserUpdate,
) -> Result<(), ApiError> {
    if let Some(name) = non_empty(&update.name) {
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ApiError::bad_request("Name cannot be more than 255 characters."));
        }
        db.update_user_field(user_id, UserField::Name, name)
            .map_err(|e| ApiError::internal("Could not update name.", e))?;
    }

    if let Some(username) = non_empty(&update.username) {
        if let Some(owner) = db.get_user_by_username(username)? {
            if owner.user_id != user_id {
                return Err(ApiError::Conflict("This username is already in use.".into()));
            }
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(ApiError::bad_request("Username cannot be more than 32 characters."));
        }
        db.update_user_field(user_id, UserField::Username, username)
            .map_err(|e| ApiError::user_write("Could not update username.", e))?;
    }

    if let Some(email) = non_empty(&update.email) {
        if let Some(owner) = db.get_user_by_email(email)? {
            if owner.user_id != user_id {
                return Err(ApiError::Conflict("This email is already in use.".into()));
            }
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(ApiError::bad_request("Email cannot be more than 255 characters."));
        }
        db.update_user_field(user_id, UserField::Email, email)
            .map_err(|e| ApiError::user_write("Could not update email.", e))?;
    }

    if let Some(bio) = &update.bio {
        if bio.len() > MAX_BIO_BYTES {
            return Err(ApiError::bad_request("Bio cannot be more than 65535 bytes."));
        }
        db.update_user_field(user_id, UserField::Bio, bio)
            .map_err(|e| ApiError::internal("Could not update bio.", e))?;
    }

    if let Some(password) = non_empty(&update.password) {
        let hash = hash_password(password)?;
        db.update_user_field(user_id, UserField::Password, &hash)
            .map_err(|e| ApiError::internal("Could not update password.", e))?;
    }

    Ok(())
}

/// A new location is recorded only when both coordinates are present, numeric
/// and non-zero.
pub fn parse_location(latitude: Option<&str>, longitude: Option<&str>) -> Option<Point> {
    let coord = |raw: Option<&str>| {
        raw.and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v != 0.0)
    };
    Some(Point::new(coord(latitude)?, coord(longitude)?))
}

/// Non-PNG uploads are ignored.
async fn save_avatar(state: &AppState, user_id: i64, avatar: Avatar) -> Result<(), ApiError> {
    if avatar.content_type.as_deref() != Some("image/png") || avatar.data.is_empty() {
        debug!("Ignoring avatar upload for user {}: not a PNG", user_id);
        return Ok(());
    }

    tokio::fs::create_dir_all(&state.avatar_dir)
        .await
        .map_err(|e| ApiError::internal("Unable to upload avatar.", e))?;

    let path = state.avatar_dir.join(format!("{}.png", user_id));
    tokio::fs::write(&path, &avatar.data)
        .await
        .map_err(|e| ApiError::internal("Unable to upload avatar.", e))?;

    debug!("Saved avatar {}", path.display());
    Ok(())
}

/// POST /logout: ends the current session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let sid = current.session_id.to_string();
    let removed = run_blocking(&state, move |db| Ok(db.delete_session(&sid)?)).await?;
    if !removed {
        return Err(ApiError::internal(
            "There was an error logging out.",
            "session already gone",
        ));
    }

    info!("User {} logged out", current.id);
    Ok((
        clear_session_cookies(jar),
        Json(json!({ "success": "Successfully logged out." })),
    ))
}

/// POST /delete-user: deactivates the account. The row is kept but the user
/// drops out of every feed and can no longer log in.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = current.id;
    run_blocking(&state, move |db| {
        db.deactivate_user(user_id)
            .map_err(|e| ApiError::internal("An error occurred while deleting the user.", e))
    })
    .await?;

    info!("User {} deactivated", user_id);
    Ok((
        clear_session_cookies(jar),
        Json(json!({ "success": "User deleted successfully." })),
    ))
}

fn fetch_user(db: &Database, user_id: i64) -> Result<User, ApiError> {
    db.get_user_by_id(user_id)?
        .and_then(|row| row.to_user())
        .ok_or_else(|| ApiError::internal(GENERIC_ERROR, format!("user {} unreadable", user_id)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
