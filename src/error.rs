// src/error.rs
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::stock::StockShortage;

#[derive(Debug)]
pub enum AppError {
    Database(sqlx::Error),
    Unauthorized(String),
    NotFound(String),
    Validation(String),
    Conflict(String),
    InsufficientStock { message: String, shortages: Vec<StockShortage> },
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn insufficient_stock(shortages: Vec<StockShortage>) -> Self {
        let message = shortages
            .iter()
            .map(|s| s.message.clone())
            .collect::<Vec<_>>()
            .join("; ");
        AppError::InsufficientStock { message, shortages }
    }

    pub fn db(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server error, please retry".to_string(),
                    json!([]),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server error, please retry".to_string(),
                    json!([]),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, json!([])),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, json!([])),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, json!([])),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, json!([])),
            AppError::InsufficientStock { message, shortages } => (
                StatusCode::BAD_REQUEST,
                message,
                json!(shortages),
            ),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "errors": errors,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            other => AppError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_expected_statuses() {
        assert_eq!(
            AppError::unauthorized("Missing Authorization header")
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::not_found("product not found: 7").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::validation("quantity is required (line 1)")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::conflict("lot 'L1' was modified concurrently, please retry")
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }
}
