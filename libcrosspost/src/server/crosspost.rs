//! `POST /crosspost/`
//!
//! The client is identified by the `X-API-Key` header, falling back to
//! `"default"`. A 202 means every listed job is persisted; publishing happens
//! later on the worker pool.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::types::DEFAULT_CLIENT_ID;

pub const HEADER_API_KEY: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct CrosspostRequest {
    #[serde(default)]
    pub content: String,
    /// Defaults to every configured platform
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CrosspostResponse {
    pub message: &'static str,
    pub tasks: BTreeMap<String, Uuid>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

fn client_id(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_API_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CLIENT_ID)
        .to_string()
}

fn parse_request(body: &[u8]) -> Result<CrosspostRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("No JSON data provided".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

pub async fn crosspost_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CrosspostResponse>), ApiError> {
    let client_id = client_id(&headers);
    let dispatcher = app_state.dispatcher();

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            // Unusable bodies still count against the client's limit
            dispatcher.check_rate_limit(&client_id).await?;
            return Err(e);
        }
    };

    debug!(client_id = %client_id, "Received crosspost request");

    let submission = match &request.platforms {
        Some(platforms) => dispatcher.submit(&client_id, &request.content, platforms).await?,
        None => dispatcher.submit_all(&client_id, &request.content).await?,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(CrosspostResponse {
            message: "Cross-post tasks enqueued",
            tasks: submission.tasks,
            skipped: submission.skipped,
            timestamp: submission.timestamp,
        }),
    ))
}
