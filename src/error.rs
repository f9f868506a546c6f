use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Errors surfaced to request handlers.
///
/// `Validation`, `DataIntegrity` and `Conflict` are the domain taxonomy of the
/// nutrition core; the rest cover auth, lookups and infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("data integrity: {0}")]
    DataIntegrity(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("food provider: {0}")]
    Upstream(String),
    #[error("database: {0}")]
    Database(sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DataIntegrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = e {
            return Self::NotFound("record");
        }
        if let Some(db) = e.as_database_error() {
            match db.code().as_deref() {
                // unique_violation, serialization_failure, deadlock_detected
                Some("23505") | Some("40001") | Some("40P01") => {
                    return Self::Conflict(db.message().to_string())
                }
                // foreign_key_violation
                Some("23503") => return Self::DataIntegrity(db.message().to_string()),
                _ => {}
            }
        }
        Self::Database(e)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            match self {
                Self::Upstream(m) => m,
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };
        (status, message).into_response()
    }
}
