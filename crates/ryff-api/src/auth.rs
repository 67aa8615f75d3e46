use std::path::PathBuf;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Form, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ryff_db::Database;
use ryff_types::api::{Claims, LoginRequest, RegisterRequest};

use crate::error::ApiError;
use crate::run_blocking;

pub const USER_ID_COOKIE: &str = "user_id";
pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_USERNAME_LEN: usize = 32;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Lifetime of a login, in days. Older session rows are pruned.
pub const SESSION_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub avatar_dir: PathBuf,
    pub riff_dir: PathBuf,
    /// Public base URL, used to build riff links.
    pub site_root: String,
}

pub async fn register(
    State(state): State<AppState>,
    Form(req): Form<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username_len = req.username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len) {
        return Err(ApiError::bad_request(format!(
            "Username must be between {} and {} characters.",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if req.email.is_empty() || req.email.chars().count() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request(
            "Email must be between 1 and 255 characters.",
        ));
    }
    if req.name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request("Name cannot be more than 255 characters."));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 8 characters."));
    }

    let user = run_blocking(&state, move |db| {
        if db.get_user_by_username(&req.username)?.is_some() {
            return Err(ApiError::Conflict("This username is already in use.".into()));
        }
        if db.get_user_by_email(&req.email)?.is_some() {
            return Err(ApiError::Conflict("This email is already in use.".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let user_id = db
            .create_user(&req.name, &req.username, &req.email, &password_hash)
            .map_err(|e| ApiError::user_write("Could not create user.", e))?;

        db.get_user_by_id(user_id)?
            .and_then(|row| row.to_user())
            .ok_or_else(|| ApiError::internal("Could not create user.", "row vanished"))
    })
    .await?;

    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "Account created.", "user": user })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = Uuid::new_v4();

    let user = run_blocking(&state, move |db| {
        let invalid = || ApiError::Unauthorized("Invalid username or password.".into());

        let row = db
            .get_user_by_username(&req.auth_username)?
            .filter(|row| row.active)
            .ok_or_else(invalid)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&row.password)
            .map_err(|e| ApiError::internal("Invalid stored password hash", e))?;
        Argon2::default()
            .verify_password(req.auth_password.as_bytes(), &parsed_hash)
            .map_err(|_| invalid())?;

        db.create_session(&session_id.to_string(), row.user_id)?;

        let expired_before = chrono::Utc::now() - chrono::Duration::days(SESSION_DAYS);
        match db.prune_sessions(expired_before) {
            Ok(0) => {}
            Ok(count) => info!("Pruned {} expired sessions", count),
            Err(e) => warn!("Session prune error: {}", e),
        }

        row.to_user()
            .ok_or_else(|| ApiError::internal("Corrupt user row", row.user_id))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, session_id)
        .map_err(|e| ApiError::internal("Could not log in.", e))?;

    let jar = jar
        .add(session_cookie(USER_ID_COOKIE, user.id.to_string()))
        .add(session_cookie(AUTH_TOKEN_COOKIE, token));

    info!("User {} logged in", user.id);

    Ok((
        jar,
        Json(json!({ "success": "Successfully logged in.", "user": user })),
    ))
}

/// Argon2id hash in PHC string format.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal("Could not hash password.", e))
}

fn create_token(secret: &str, user_id: i64, session_id: Uuid) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(USER_ID_COOKIE).path("/"))
        .remove(Cookie::build(AUTH_TOKEN_COOKIE).path("/"))
}
