use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use ryff_types::api::Claims;

use crate::auth::{AUTH_TOKEN_COOKIE, AppState, USER_ID_COOKIE};
use crate::error::ApiError;
use crate::run_blocking;

/// The authenticated caller, inserted as a request extension by
/// `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: i64,
    pub session_id: Uuid,
}

/// Authenticate from the `user_id` and `auth_token` cookies. The token must
/// verify, name the same user as `user_id`, and refer to a live session of an
/// active user.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let unauthorized = || ApiError::Unauthorized("You must be logged in.".into());

    let user_id: i64 = jar
        .get(USER_ID_COOKIE)
        .and_then(|c| c.value().parse().ok())
        .ok_or_else(unauthorized)?;
    let token = jar.get(AUTH_TOKEN_COOKIE).ok_or_else(unauthorized)?;

    let claims = decode::<Claims>(
        token.value(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected auth token: {}", e);
        unauthorized()
    })?
    .claims;

    if claims.sub != user_id {
        return Err(unauthorized());
    }

    let sid = claims.sid.to_string();
    let live = run_blocking(&state, move |db| Ok(db.session_is_active(&sid, user_id)?)).await?;
    if !live {
        return Err(unauthorized());
    }

    req.extensions_mut().insert(CurrentUser {
        id: user_id,
        session_id: claims.sid,
    });
    Ok(next.run(req).await)
}
