//! Error types shared by the store, the workflow engine and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ExpenseStatus;

/// Failures raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row changed since it was read; the compare-and-swap lost.
    #[error("concurrent update on expense {expense_id}: expected version {expected_version}")]
    Conflict { expense_id: Uuid, expected_version: i64 },

    /// A guarded write found the claim in a status it does not allow.
    #[error("expense {expense_id} is {status}")]
    StatusChanged { expense_id: Uuid, status: ExpenseStatus },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("receipt file error: {0}")]
    File(#[from] std::io::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Workflow-level failures. Every variant leaves claim state untouched.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing, or hidden from the caller. The two are deliberately indistinguishable.
    #[error("claim not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("cannot {operation} a claim in status {status}")]
    InvalidTransition {
        status: ExpenseStatus,
        operation: &'static str,
    },

    #[error("no approver can be resolved: {0}")]
    RoutingUnresolved(&'static str),

    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("authentication required")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Workflow(err) => match err {
                WorkflowError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "validation_error", err.to_string())
                }
                WorkflowError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                WorkflowError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", err.to_string()),
                WorkflowError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition", err.to_string())
                }
                WorkflowError::RoutingUnresolved(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "routing_unresolved",
                    err.to_string(),
                ),
                WorkflowError::Invariant(_) | WorkflowError::Store(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                ),
            },
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "validation_error", self.to_string())
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Workflow(WorkflowError::Store(err))
    }
}
