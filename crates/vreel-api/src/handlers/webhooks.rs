//! Render callback webhooks.
//!
//! Both endpoints answer 200 for every well-formed payload, duplicates and
//! out-of-order deliveries included, and report whether the job moved. A
//! final callback naming another video than its job is a 400. A 5xx is
//! returned only when persistence failed and the sender should retry.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vreel_render::{EventOutcome, FinalCallback, FirstStageCallback};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_webhook;
use crate::state::AppState;

/// Body returned for an accepted callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub accepted: bool,
    /// Whether the callback changed the job's state
    pub applied: bool,
}

impl WebhookAck {
    fn from_outcome(outcome: &EventOutcome) -> Self {
        Self {
            accepted: true,
            applied: outcome.applied(),
        }
    }
}

fn outcome_label(result: &ApiResult<WebhookAck>) -> &'static str {
    match result {
        Ok(ack) if ack.applied => "applied",
        Ok(_) => "ignored",
        Err(e) if e.status_code().is_client_error() => "rejected",
        Err(_) => "error",
    }
}

/// `POST /webhooks/render`: first-stage callback from the render engine.
pub async fn render_callback(
    State(state): State<AppState>,
    payload: Result<Json<FirstStageCallback>, JsonRejection>,
) -> ApiResult<Json<WebhookAck>> {
    let result = handle_render_callback(&state, payload).await;
    record_webhook("render", outcome_label(&result));
    result.map(Json)
}

async fn handle_render_callback(
    state: &AppState,
    payload: Result<Json<FirstStageCallback>, JsonRejection>,
) -> ApiResult<WebhookAck> {
    let Json(callback) = payload?;

    let outcome = state
        .orchestrator
        .handle_first_stage(&callback)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("unknown render status '{}'", callback.status)))?;

    info!(
        render_job_id = %callback.job_id,
        status = %callback.status,
        job_status = %outcome.job.status,
        applied = outcome.applied(),
        "First-stage callback handled"
    );
    Ok(WebhookAck::from_outcome(&outcome))
}

/// `POST /webhooks/final`: final callback from the overlay worker.
pub async fn final_callback(
    State(state): State<AppState>,
    payload: Result<Json<FinalCallback>, JsonRejection>,
) -> ApiResult<Json<WebhookAck>> {
    let result = handle_final_callback(&state, payload).await;
    record_webhook("final", outcome_label(&result));
    result.map(Json)
}

async fn handle_final_callback(
    state: &AppState,
    payload: Result<Json<FinalCallback>, JsonRejection>,
) -> ApiResult<WebhookAck> {
    let Json(callback) = payload?;

    let outcome = state.orchestrator.handle_final(&callback).await.map_err(|e| {
        if e.is_rejected_callback() {
            warn!(render_job_id = %callback.job_id, video_id = %callback.video_id, "Rejecting final callback: {}", e);
        }
        e
    })?;

    info!(
        render_job_id = %callback.job_id,
        video_id = %outcome.job.video_id,
        status = %callback.status,
        job_status = %outcome.job.status,
        applied = outcome.applied(),
        "Final callback handled"
    );
    Ok(WebhookAck::from_outcome(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::{DateTime, Utc};
    use tower::ServiceExt;

    use vreel_firestore::{FirestoreError, FirestoreResult, MemoryStore, RenderJobStore, Versioned};
    use vreel_models::{
        CompositionScript, RenderJob, RenderJobId, RenderStatus, TextOverlay, VideoId, VideoStatus,
    };
    use vreel_queue::{JobPublisher, QueueJob, QueueResult};
    use vreel_render::{
        CompilerConfig, RenderCompiler, RenderEngine, RenderJobSpec, RenderOrchestrator, RenderResult,
    };

    use crate::config::ApiConfig;
    use crate::routes::create_router;

    struct Engine;

    #[async_trait]
    impl RenderEngine for Engine {
        async fn submit(&self, _spec: &RenderJobSpec) -> RenderResult<String> {
            Ok("ext-1".to_string())
        }
    }

    #[derive(Default)]
    struct Publisher {
        published: Mutex<Vec<QueueJob>>,
    }

    #[async_trait]
    impl JobPublisher for Publisher {
        async fn publish(&self, job: QueueJob) -> QueueResult<String> {
            self.published.lock().unwrap().push(job);
            Ok("1-0".to_string())
        }
    }

    /// Job store whose reads fail like an unreachable Firestore.
    struct Unreachable;

    #[async_trait]
    impl RenderJobStore for Unreachable {
        async fn create_job(&self, _job: &RenderJob) -> FirestoreResult<()> {
            Ok(())
        }

        async fn load_job(&self, _id: &RenderJobId) -> FirestoreResult<Option<Versioned<RenderJob>>> {
            Err(FirestoreError::RequestFailed {
                status: 503,
                message: "unavailable".into(),
            })
        }

        async fn save_job(&self, _job: &RenderJob, _expected_version: Option<&str>) -> FirestoreResult<()> {
            Ok(())
        }

        async fn list_stale_jobs(&self, _before: DateTime<Utc>, _limit: u32) -> FirestoreResult<Vec<RenderJob>> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        publisher: Arc<Publisher>,
        orchestrator: Arc<RenderOrchestrator>,
        app: Router,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(Publisher::default());
        let orchestrator = Arc::new(RenderOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(Engine),
            publisher.clone(),
            RenderCompiler::new(CompilerConfig::default()),
        ));
        let app = create_router(
            AppState::with_orchestrator(ApiConfig::default(), orchestrator.clone()),
            None,
        );
        Harness {
            store,
            publisher,
            orchestrator,
            app,
        }
    }

    async fn submitted_job(h: &Harness, overlays: Vec<TextOverlay>) -> RenderJob {
        let script = CompositionScript {
            clips: Vec::new(),
            overlays,
            total_duration: 6.0,
        };
        h.orchestrator
            .submit(RenderJob::new(VideoId::from("v-1"), "prop", "owner", script))
            .await
            .unwrap()
    }

    async fn post(app: &Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn render_body(job_id: &RenderJobId, status: &str) -> String {
        serde_json::json!({
            "job_id": job_id,
            "status": status,
            "output_url": "https://engine.test/out/base.mp4"
        })
        .to_string()
    }

    fn final_body(job_id: &RenderJobId, status: &str) -> String {
        final_body_for("v-1", job_id, status)
    }

    fn final_body_for(video_id: &str, job_id: &RenderJobId, status: &str) -> String {
        serde_json::json!({
            "video_id": video_id,
            "job_id": job_id,
            "status": status,
            "file_url": "https://cdn.test/final.mp4",
            "thumbnail_url": "https://cdn.test/final.jpg",
            "duration": 6.0
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_complete_without_overlays_finishes_job() {
        let h = harness();
        let job = submitted_job(&h, Vec::new()).await;

        let (status, body) = post(&h.app, "/webhooks/render", render_body(&job.id, "COMPLETE")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"accepted": true, "applied": true}));

        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::Complete);
        let video = h.store.video(&VideoId::from("v-1")).unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.file_url.as_deref(), Some("https://engine.test/out/base.mp4"));
    }

    #[tokio::test]
    async fn test_complete_with_overlays_queues_second_stage() {
        let h = harness();
        let job = submitted_job(&h, vec![TextOverlay::new("Welcome", 0.0, 2.0)]).await;

        let (status, _) = post(&h.app, "/webhooks/render", render_body(&job.id, "complete")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::AwaitingOverlay);
        assert!(matches!(
            h.publisher.published.lock().unwrap().as_slice(),
            [QueueJob::BurnOverlays(_)]
        ));

        let (status, body) = post(&h.app, "/webhooks/final", final_body(&job.id, "Success")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], true);

        let video = h.store.video(&VideoId::from("v-1")).unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.file_url.as_deref(), Some("https://cdn.test/final.mp4"));
        assert_eq!(video.duration, Some(6.0));
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_accepted_but_not_applied() {
        let h = harness();
        let job = submitted_job(&h, Vec::new()).await;

        post(&h.app, "/webhooks/render", render_body(&job.id, "COMPLETE")).await;
        let (status, body) = post(&h.app, "/webhooks/render", render_body(&job.id, "COMPLETE")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"accepted": true, "applied": false}));
        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::Complete);
    }

    #[tokio::test]
    async fn test_late_progress_after_failure_is_ignored() {
        let h = harness();
        let job = submitted_job(&h, Vec::new()).await;

        let error = serde_json::json!({"job_id": job.id, "status": "ERROR", "error_message": "codec"});
        let (_, body) = post(&h.app, "/webhooks/render", error.to_string()).await;
        assert_eq!(body["applied"], true);

        let (status, body) = post(&h.app, "/webhooks/render", render_body(&job.id, "PROGRESSING")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], false);

        let video = h.store.video(&VideoId::from("v-1")).unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.error_message.as_deref(), Some("codec"));
    }

    #[tokio::test]
    async fn test_failed_final_status_fails_job() {
        let h = harness();
        let job = submitted_job(&h, vec![TextOverlay::new("Hi", 0.0, 1.0)]).await;
        post(&h.app, "/webhooks/render", render_body(&job.id, "COMPLETE")).await;

        let (status, _) = post(&h.app, "/webhooks/final", final_body(&job.id, "exploded")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::Failed);
    }

    #[tokio::test]
    async fn test_final_callback_for_wrong_video_is_rejected() {
        let h = harness();
        let job = submitted_job(&h, vec![TextOverlay::new("Hi", 0.0, 1.0)]).await;
        post(&h.app, "/webhooks/render", render_body(&job.id, "COMPLETE")).await;

        let (status, body) = post(&h.app, "/webhooks/final", final_body_for("v-2", &job.id, "complete")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "video_mismatch");
        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::AwaitingOverlay);
        assert_eq!(h.store.video(&VideoId::from("v-1")).unwrap().status, VideoStatus::Generating);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let h = harness();
        let (status, body) = post(&h.app, "/webhooks/render", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, _) = post(&h.app, "/webhooks/final", r#"{"job_id": "x"}"#.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_status_is_bad_request() {
        let h = harness();
        let job = submitted_job(&h, Vec::new()).await;
        let (status, _) = post(&h.app, "/webhooks/render", render_body(&job.id, "HALFWAY")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.store.job(&job.id).unwrap().status, RenderStatus::Submitted);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = harness();
        let (status, body) = post(
            &h.app,
            "/webhooks/render",
            render_body(&RenderJobId::from("missing"), "COMPLETE"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "unknown_job");
    }

    #[tokio::test]
    async fn test_persistence_failure_is_server_error() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(RenderOrchestrator::new(
            Arc::new(Unreachable),
            store,
            Arc::new(Engine),
            Arc::new(Publisher::default()),
            RenderCompiler::new(CompilerConfig::default()),
        ));
        let app = create_router(AppState::with_orchestrator(ApiConfig::default(), orchestrator), None);

        let (status, _) = post(&app, "/webhooks/final", final_body(&RenderJobId::from("rj"), "done")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-Request-ID"));
    }
}
