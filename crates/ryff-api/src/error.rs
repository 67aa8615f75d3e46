use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const GENERIC_ERROR: &str = "An error occurred processing your request.";

/// Error half of the JSON envelope: rendered as `{"error": "<message>"}`.
/// The message is always safe to show to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Logs `cause` and hides it behind `message`.
    pub fn internal(message: &str, cause: impl std::fmt::Display) -> Self {
        error!("{}: {}", message, cause);
        Self::Internal(message.to_string())
    }

    /// For a failed user write: a UNIQUE clash on username or email becomes
    /// the matching conflict, anything else an internal error.
    pub fn user_write(message: &str, cause: anyhow::Error) -> Self {
        let column = ryff_db::unique_violation(&cause).map(str::to_string);
        let conflict = match column.as_deref() {
            Some("users.username") => "This username is already in use.",
            Some("users.email") => "This email is already in use.",
            _ => return Self::internal(message, cause),
        };
        Self::Conflict(conflict.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(GENERIC_ERROR, e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Conflict("This username is already in use.".into()).status(),
            StatusCode::CONFLICT
        );
        let err = ApiError::internal("Could not update bio.", "disk I/O error");
        assert_eq!(err.to_string(), "Could not update bio.");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unique_clashes_become_conflicts() {
        let db = ryff_db::Database::open_in_memory().unwrap();
        db.create_user("Ann", "ann", "ann@example.com", "x").unwrap();

        let cause = db.create_user("B", "ann", "b@example.com", "x").unwrap_err();
        let err = ApiError::user_write("Could not create user.", cause);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "This username is already in use.");

        let cause = db.create_user("B", "bee", "ann@example.com", "x").unwrap_err();
        let err = ApiError::user_write("Could not create user.", cause);
        assert_eq!(err.to_string(), "This email is already in use.");

        let err = ApiError::user_write("Could not create user.", anyhow::anyhow!("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Could not create user.");
    }
}
