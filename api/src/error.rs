use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use twin_core::consent::ConsentScope;
use twin_core::error::{self, ApiError, ChatTurnError};

pub const CONSENT_MESSAGE: &str = "Please grant consent to continue.";

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or malformed caller identity (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Missing consent scopes (403)
    ConsentRequired { missing_scopes: Vec<ConsentScope> },
    /// Resource does not exist or belongs to another user (404)
    NotFound { resource: String },
    /// Database error (500)
    Database(sqlx::Error),
}

impl AppError {
    fn body(error: &str, message: String, request_id: String) -> ApiError {
        ApiError {
            error: error.to_string(),
            message,
            field: None,
            received: None,
            request_id,
            docs_hint: None,
            required_scopes: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    field,
                    received,
                    docs_hint,
                    ..Self::body(error::codes::VALIDATION_FAILED, message, request_id)
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    docs_hint,
                    ..Self::body(error::codes::UNAUTHORIZED, message, request_id)
                },
            ),
            AppError::ConsentRequired { missing_scopes } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    required_scopes: Some(missing_scopes),
                    docs_hint: Some(
                        "Grant the listed scopes via POST /v1/consent/grant-bulk, then retry."
                            .to_string(),
                    ),
                    ..Self::body(
                        error::codes::CONSENT_REQUIRED,
                        CONSENT_MESSAGE.to_string(),
                        request_id,
                    )
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                Self::body(
                    error::codes::NOT_FOUND,
                    format!("{resource} not found"),
                    request_id,
                ),
            ),
            AppError::Database(err) => {
                tracing::error!(error = ?err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Self::body(
                        error::codes::INTERNAL_ERROR,
                        "An internal error occurred".to_string(),
                        request_id,
                    ),
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<ChatTurnError> for AppError {
    fn from(err: ChatTurnError) -> Self {
        match err {
            ChatTurnError::ConsentRequired { missing_scopes } => {
                AppError::ConsentRequired { missing_scopes }
            }
        }
    }
}
