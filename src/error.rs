use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::view::Page;

/// Failures of page routes. Each variant maps to a redirect or an error page.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Access denied")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated => Redirect::to("/login").into_response(),
            AppError::Forbidden => Page::new("home", "Home")
                .error("Access denied")
                .status(StatusCode::FORBIDDEN)
                .into_response(),
            AppError::NotFound(what) => Page::new("home", "Not Found")
                .error(what)
                .status(StatusCode::NOT_FOUND)
                .into_response(),
            AppError::Database(e) => {
                log::error!("Database error: {}", e);
                server_error()
            }
            AppError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                server_error()
            }
        }
    }
}

fn server_error() -> Response {
    Page::new("home", "Home")
        .error("Server error")
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

/// Failures of the JSON endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Access denied")]
    Forbidden,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            ApiError::Database(e) => {
                log::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
