//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vreel_models::{
    AssetId, JobId, RenderJobId, SlotAssignment, SlotScriptPayload, TextOverlay, VideoId,
};

/// Job to ingest one uploaded footage asset.
///
/// Enqueued on upload, and again by the sweeper for assets that ended in
/// `pending_retry` or were left `processing` by a crashed worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAssetJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Asset to ingest
    pub asset_id: AssetId,
    /// Sweeper re-queue count this job was created with
    #[serde(default)]
    pub retry_count: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl IngestAssetJob {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            job_id: JobId::new(),
            asset_id,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    /// A sweeper re-queue.
    pub fn requeue(asset_id: AssetId, retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Self::new(asset_id)
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("ingest:{}:{}", self.asset_id, self.retry_count)
    }
}

/// Job to assemble and submit a video for one property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Video record the render result lands on
    pub video_id: VideoId,
    pub property_id: String,
    pub owner_id: String,
    /// Template slots, structured or as model-produced text
    pub slot_script: SlotScriptPayload,
    /// Text overlays requested by the caller
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
    /// Hand-edited total duration; wins over the computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_total_duration: Option<f64>,
    /// Hand-edited assignments; matching is skipped when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_assignments: Option<Vec<SlotAssignment>>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl GenerateVideoJob {
    pub fn new(
        video_id: VideoId,
        property_id: impl Into<String>,
        owner_id: impl Into<String>,
        slot_script: SlotScriptPayload,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            property_id: property_id.into(),
            owner_id: owner_id.into(),
            slot_script,
            text_overlays: Vec::new(),
            manual_total_duration: None,
            manual_assignments: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_overlays(mut self, overlays: Vec<TextOverlay>) -> Self {
        self.text_overlays = overlays;
        self
    }

    pub fn with_manual_timeline(
        mut self,
        assignments: Vec<SlotAssignment>,
        total_duration: Option<f64>,
    ) -> Self {
        self.manual_assignments = Some(assignments);
        self.manual_total_duration = total_duration;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}:{}", self.owner_id, self.video_id)
    }
}

/// Job to resubmit a render job the sweeper timed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResubmitRenderJob {
    /// Unique job ID
    pub job_id: JobId,
    /// The failed render job whose script is rendered again
    pub previous_job_id: RenderJobId,
    /// Attempt number of the job being created
    pub attempt: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ResubmitRenderJob {
    pub fn new(previous_job_id: RenderJobId, attempt: u32) -> Self {
        Self {
            job_id: JobId::new(),
            previous_job_id,
            attempt,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("resubmit:{}:{}", self.previous_job_id, self.attempt)
    }
}

/// Second-stage message: burn text overlays into a first-stage render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayBurnInJob {
    /// Render job this stage belongs to
    pub job_id: RenderJobId,
    pub video_id: VideoId,
    pub property_id: String,
    /// First-stage output
    pub base_video_url: String,
    pub text_overlays: Vec<TextOverlay>,
}

impl OverlayBurnInJob {
    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("overlay:{}", self.job_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Describe, probe and thumbnail one asset
    IngestAsset(IngestAssetJob),
    /// Match footage to slots, build, compile and submit
    GenerateVideo(GenerateVideoJob),
    /// Render a timed-out job's script again
    ResubmitRender(ResubmitRenderJob),
    /// Second-stage text burn-in
    BurnOverlays(OverlayBurnInJob),
}

impl QueueJob {
    /// Identifier used in logs; the render job id for second-stage messages.
    pub fn job_id(&self) -> String {
        match self {
            QueueJob::IngestAsset(j) => j.job_id.to_string(),
            QueueJob::GenerateVideo(j) => j.job_id.to_string(),
            QueueJob::ResubmitRender(j) => j.job_id.to_string(),
            QueueJob::BurnOverlays(j) => j.job_id.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::IngestAsset(_) => "ingest_asset",
            QueueJob::GenerateVideo(_) => "generate_video",
            QueueJob::ResubmitRender(_) => "resubmit_render",
            QueueJob::BurnOverlays(_) => "burn_overlays",
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::IngestAsset(j) => j.idempotency_key(),
            QueueJob::GenerateVideo(j) => j.idempotency_key(),
            QueueJob::ResubmitRender(j) => j.idempotency_key(),
            QueueJob::BurnOverlays(j) => j.idempotency_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_message_wire_shape() {
        let job = QueueJob::BurnOverlays(OverlayBurnInJob {
            job_id: RenderJobId::from("rj-1"),
            video_id: VideoId::from("v-1"),
            property_id: "p-1".into(),
            base_video_url: "https://cdn/base.mp4".into(),
            text_overlays: vec![TextOverlay::new("Sea view", 0.5, 2.5)],
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "burn_overlays");
        assert_eq!(value["job_id"], "rj-1");
        assert_eq!(value["base_video_url"], "https://cdn/base.mp4");
        assert_eq!(value["text_overlays"][0]["content"], "Sea view");
    }

    #[test]
    fn test_generate_job_accepts_text_script() {
        let json = r#"{
            "type": "generate_video",
            "job_id": "j1",
            "video_id": "v1",
            "property_id": "p1",
            "owner_id": "u1",
            "slot_script": "```json\n[{\"duration\": 3, \"description\": \"pool\"}]\n```",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let job: QueueJob = serde_json::from_str(json).unwrap();
        match job {
            QueueJob::GenerateVideo(j) => {
                assert!(matches!(j.slot_script, SlotScriptPayload::Text(_)));
                assert!(j.text_overlays.is_empty());
                assert!(j.manual_assignments.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_requeue_changes_idempotency_key() {
        let id = AssetId::from("a1");
        let first = IngestAssetJob::new(id.clone());
        let again = IngestAssetJob::requeue(id, 1);
        assert_ne!(first.idempotency_key(), again.idempotency_key());
    }
}
