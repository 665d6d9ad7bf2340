//! `GET /jobs/{id}`: state of one publish job

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::types::{JobRecord, JobResult};

#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: JobRecord,
    /// Present once the job is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

pub async fn job_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::BadRequest(format!("Invalid job id: {}", id)))?;

    let job = app_state
        .queue()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    let result = job.result();
    Ok(Json(JobResponse { job, result }))
}

#[cfg(test)]
mod tests {
    use crate::server::build_router;
    use crate::server::test_support::test_app;
    use crate::types::PublishJob;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn get(app: &crate::server::test_support::TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = build_router(app.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn queued_job_has_no_result() {
        let app = test_app(10).await;
        let job = PublishJob::new("Twitter", "hello", "c1");
        app.state.queue().enqueue(&job).await.unwrap();

        let (status, body) = get(&app, &format!("/jobs/{}", job.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["platform"], "Twitter");
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn completed_job_includes_result() {
        let app = test_app(10).await;
        let job = PublishJob::new("Twitter", "hello", "c1");
        let queue = app.state.queue();
        queue.enqueue(&job).await.unwrap();
        queue.claim("w1").await.unwrap();
        queue.complete(job.id, "w1", &json!({"id": "99"})).await.unwrap();

        let (status, body) = get(&app, &format!("/jobs/{}", job.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["status"], "succeeded");
        assert_eq!(body["result"]["payload"]["id"], "99");
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let app = test_app(10).await;
        let (status, body) = get(&app, &format!("/jobs/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");
    }

    #[tokio::test]
    async fn malformed_id_is_400() {
        let app = test_app(10).await;
        let (status, _) = get(&app, "/jobs/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
