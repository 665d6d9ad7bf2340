//! HTTP surface for submitting crossposts
//!
//! # Endpoints
//!
//! - `POST /crosspost/` - Validate, optimize and enqueue (returns 202 Accepted)
//! - `GET /jobs/{id}` - Current state of one publish job
//! - `GET /health/` - Liveness check
//!
//! Paths are also served without the trailing slash.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::CrosspostError;
use crate::queue::JobQueue;

pub mod crosspost;
pub mod health;
pub mod jobs;

pub use crosspost::crosspost_handler;
pub use health::health_handler;
pub use jobs::job_handler;

/// Shared application state, passed to handlers via axum's `State` extractor
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Arc<Dispatcher>,
    queue: JobQueue,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, queue: JobQueue) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { dispatcher, queue }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }
}

/// Builds the axum Router with all endpoints
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/crosspost/", post(crosspost_handler))
        .route("/crosspost", post(crosspost_handler))
        .route("/jobs/{id}", get(job_handler))
        .route("/health/", get(health_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Errors surfaced to HTTP clients as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Crosspost(#[from] CrosspostError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::Crosspost(CrosspostError::RateLimitExceeded(_)) => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
            ApiError::Crosspost(CrosspostError::Validation(message))
            | ApiError::Crosspost(CrosspostError::InvalidInput(message)) => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            ApiError::Crosspost(e @ CrosspostError::Optimization { .. }) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            ApiError::Crosspost(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
