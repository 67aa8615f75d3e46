pub mod auth;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod posts;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use ryff_db::Database;

use crate::auth::AppState;
use crate::error::{ApiError, GENERIC_ERROR};

/// 8 MB request limit for update-user (avatar uploads)
const MAX_UPLOAD_SIZE: usize = 8 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/logout", post(users::logout))
        .route("/delete-user", post(users::delete_user))
        .route(
            "/update-user",
            post(users::update_user).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/users/nearby", get(feed::nearby))
        .route("/users/trending", get(feed::trending))
        .route("/posts/{post_id}", get(posts::get_post))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/avatars", ServeDir::new(&state.avatar_dir))
        .nest_service("/riffs", ServeDir::new(&state.riff_dir))
        .with_state(state)
}

/// Runs blocking DB work off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| ApiError::internal(GENERIC_ERROR, e))?
}
