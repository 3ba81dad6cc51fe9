//! Persistence traits the pipeline depends on.
//!
//! Firestore repositories implement these, and so does [`crate::memory::MemoryStore`]
//! for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vreel_models::{
    AssetId, AssetOutcome, AssetStatus, FootageAsset, RenderJob, RenderJobId, VideoId, VideoRecord,
};

use crate::error::FirestoreResult;

/// A value plus the version token its next conditional write must present.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    /// Firestore `updateTime`; `None` for stores without versions
    pub version: Option<String>,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_asset(&self, id: &AssetId) -> FirestoreResult<Option<FootageAsset>>;

    /// Status-only write (claiming an asset, or reverting a claim).
    async fn set_asset_status(&self, id: &AssetId, status: AssetStatus) -> FirestoreResult<()>;

    /// Write every ingestion result in one update.
    async fn apply_outcome(&self, id: &AssetId, outcome: &AssetOutcome) -> FirestoreResult<()>;

    /// Record a sweeper re-queue.
    async fn mark_requeued(&self, id: &AssetId, retry_count: u32) -> FirestoreResult<()>;

    /// Ready assets of one property, the matching candidate pool.
    async fn list_ready_assets(&self, property_id: &str) -> FirestoreResult<Vec<FootageAsset>>;

    /// Assets in `statuses` not updated since `updated_before`, oldest first.
    async fn list_stale_assets(
        &self,
        statuses: &[AssetStatus],
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<FootageAsset>>;
}

#[async_trait]
pub trait RenderJobStore: Send + Sync {
    async fn create_job(&self, job: &RenderJob) -> FirestoreResult<()>;

    async fn load_job(&self, id: &RenderJobId) -> FirestoreResult<Option<Versioned<RenderJob>>>;

    /// Save a job. With `expected_version` the write fails with
    /// `PreconditionFailed` if another writer got there first.
    async fn save_job(&self, job: &RenderJob, expected_version: Option<&str>) -> FirestoreResult<()>;

    /// Non-terminal jobs not updated since `updated_before`, oldest first.
    async fn list_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<RenderJob>>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>>;

    /// Create or overwrite the record.
    async fn upsert_video(&self, record: &VideoRecord) -> FirestoreResult<()>;
}
