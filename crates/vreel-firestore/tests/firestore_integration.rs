//! Firestore integration tests.

use vreel_firestore::{FirestoreClient, RenderJobRepository, RenderJobStore, VideoRepository, VideoStore};
use vreel_models::{CompositionScript, RenderEvent, RenderJob, VideoId, VideoRecord, VideoStatus};

async fn client() -> FirestoreClient {
    dotenvy::dotenv().ok();
    FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client")
}

#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_render_job_save_precondition() {
    let repo = RenderJobRepository::new(client().await);
    let script = CompositionScript {
        clips: Vec::new(),
        overlays: Vec::new(),
        total_duration: 4.0,
    };
    let job = RenderJob::new(VideoId::from("it-video"), "it-property", "it-owner", script);
    repo.create_job(&job).await.expect("Failed to create render job");

    let loaded = repo.load_job(&job.id).await.expect("Failed to load").expect("job missing");
    let stale_version = loaded.version.clone();

    let mut first = loaded.value.clone();
    first.apply(RenderEvent::Submitted {
        external_id: "ext-it".into(),
    });
    repo.save_job(&first, stale_version.as_deref()).await.expect("First save failed");

    let mut second = loaded.value;
    second.apply(RenderEvent::Failed { error: "late".into() });
    let err = repo
        .save_job(&second, stale_version.as_deref())
        .await
        .expect_err("stale write should be rejected");
    assert!(err.is_precondition_failed());
}

#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_video_upsert_roundtrip() {
    let repo = VideoRepository::new(client().await);
    let video_id = VideoId::from(format!("it-{}", uuid::Uuid::new_v4()));

    let record = VideoRecord::failed(video_id.clone(), "it-property", "it-owner", "integration");
    repo.upsert_video(&record).await.expect("Failed to upsert video");

    let fetched = repo.get_video(&video_id).await.expect("Failed to get video").expect("video missing");
    assert_eq!(fetched.status, VideoStatus::Failed);
    assert_eq!(fetched.error_message.as_deref(), Some("integration"));
}
