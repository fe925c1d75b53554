// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use tp_queue::QueueError;

use super::types::ErrorBody;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("job not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(_) => ApiError::NotFound,
            QueueError::JobActive(id) => {
                ApiError::Conflict(format!("job {id} is processing; cancel its lease first"))
            }
            QueueError::JobCompleted(id) => {
                ApiError::BadRequest(format!("job {id} is completed; delete it instead"))
            }
            QueueError::Terminal(id) => {
                ApiError::Conflict(format!("job {id} is in a terminal state"))
            }
            QueueError::TerminalPriority(id) => {
                ApiError::Conflict(format!("cannot change priority of terminal job {id}"))
            }
            QueueError::DuplicatePath(path) => ApiError::Conflict(format!(
                "an active job already exists for {}",
                path.display()
            )),
            QueueError::DuplicateJob(id) => {
                ApiError::Conflict(format!("job {id} already exists"))
            }
            QueueError::LeaseExpired(id) => {
                ApiError::Conflict(format!("lease for job {id} is expired"))
            }
            QueueError::Store(e) => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.code().to_string(), message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}
