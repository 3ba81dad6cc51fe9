//! In-memory store for tests and local runs without Firestore.
//!
//! Render jobs carry a monotonically increasing version so conditional
//! writes behave like Firestore's `updateTime` preconditions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vreel_models::{
    AssetId, AssetOutcome, AssetStatus, FootageAsset, RenderJob, RenderJobId, VideoId, VideoRecord,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{AssetStore, RenderJobStore, VideoStore, Versioned};

#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<HashMap<AssetId, FootageAsset>>,
    jobs: Mutex<HashMap<RenderJobId, (RenderJob, u64)>>,
    videos: Mutex<HashMap<VideoId, VideoRecord>>,
    next_version: AtomicU64,
}

fn poisoned<T>(_: T) -> FirestoreError {
    FirestoreError::RequestFailed {
        status: 500,
        message: "memory store lock poisoned".to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn insert_asset(&self, asset: FootageAsset) {
        if let Ok(mut assets) = self.assets.lock() {
            assets.insert(asset.id.clone(), asset);
        }
    }

    pub fn asset(&self, id: &AssetId) -> Option<FootageAsset> {
        self.assets.lock().ok()?.get(id).cloned()
    }

    pub fn job(&self, id: &RenderJobId) -> Option<RenderJob> {
        self.jobs.lock().ok()?.get(id).map(|(job, _)| job.clone())
    }

    pub fn jobs(&self) -> Vec<RenderJob> {
        self.jobs
            .lock()
            .map(|jobs| jobs.values().map(|(job, _)| job.clone()).collect())
            .unwrap_or_default()
    }

    pub fn video(&self, id: &VideoId) -> Option<VideoRecord> {
        self.videos.lock().ok()?.get(id).cloned()
    }

    /// Overwrite a job's `updated_at`, for stuck-job scenarios.
    pub fn backdate_job(&self, id: &RenderJobId, updated_at: DateTime<Utc>) {
        if let Ok(mut jobs) = self.jobs.lock() {
            if let Some((job, _)) = jobs.get_mut(id) {
                job.updated_at = updated_at;
            }
        }
    }

    /// Overwrite an asset's `updated_at`.
    pub fn backdate_asset(&self, id: &AssetId, updated_at: DateTime<Utc>) {
        if let Ok(mut assets) = self.assets.lock() {
            if let Some(asset) = assets.get_mut(id) {
                asset.updated_at = updated_at;
            }
        }
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn get_asset(&self, id: &AssetId) -> FirestoreResult<Option<FootageAsset>> {
        Ok(self.assets.lock().map_err(poisoned)?.get(id).cloned())
    }

    async fn set_asset_status(&self, id: &AssetId, status: AssetStatus) -> FirestoreResult<()> {
        let mut assets = self.assets.lock().map_err(poisoned)?;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("footage_assets/{}", id)))?;
        asset.status = status;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_outcome(&self, id: &AssetId, outcome: &AssetOutcome) -> FirestoreResult<()> {
        let mut assets = self.assets.lock().map_err(poisoned)?;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("footage_assets/{}", id)))?;
        asset.apply_outcome(outcome);
        Ok(())
    }

    async fn mark_requeued(&self, id: &AssetId, retry_count: u32) -> FirestoreResult<()> {
        let mut assets = self.assets.lock().map_err(poisoned)?;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("footage_assets/{}", id)))?;
        asset.retry_count = retry_count;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn list_ready_assets(&self, property_id: &str) -> FirestoreResult<Vec<FootageAsset>> {
        let assets = self.assets.lock().map_err(poisoned)?;
        let mut ready: Vec<FootageAsset> = assets
            .values()
            .filter(|a| a.property_id == property_id && a.status == AssetStatus::Ready)
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(ready)
    }

    async fn list_stale_assets(
        &self,
        statuses: &[AssetStatus],
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<FootageAsset>> {
        let assets = self.assets.lock().map_err(poisoned)?;
        let mut stale: Vec<FootageAsset> = assets
            .values()
            .filter(|a| statuses.contains(&a.status) && a.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl RenderJobStore for MemoryStore {
    async fn create_job(&self, job: &RenderJob) -> FirestoreResult<()> {
        let version = self.bump();
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(FirestoreError::AlreadyExists(format!("render_jobs/{}", job.id)));
        }
        jobs.insert(job.id.clone(), (job.clone(), version));
        Ok(())
    }

    async fn load_job(&self, id: &RenderJobId) -> FirestoreResult<Option<Versioned<RenderJob>>> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        Ok(jobs.get(id).map(|(job, version)| Versioned {
            value: job.clone(),
            version: Some(version.to_string()),
        }))
    }

    async fn save_job(&self, job: &RenderJob, expected_version: Option<&str>) -> FirestoreResult<()> {
        let version = self.bump();
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if let Some(expected) = expected_version {
            let current = jobs.get(&job.id).map(|(_, v)| v.to_string());
            if current.as_deref() != Some(expected) {
                return Err(FirestoreError::PreconditionFailed(format!(
                    "render_jobs/{} changed since version {}",
                    job.id, expected
                )));
            }
        }
        jobs.insert(job.id.clone(), (job.clone(), version));
        Ok(())
    }

    async fn list_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<RenderJob>> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        let mut stale: Vec<RenderJob> = jobs
            .values()
            .map(|(job, _)| job)
            .filter(|job| !job.is_terminal() && job.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        Ok(self.videos.lock().map_err(poisoned)?.get(id).cloned())
    }

    async fn upsert_video(&self, record: &VideoRecord) -> FirestoreResult<()> {
        self.videos
            .lock()
            .map_err(poisoned)?
            .insert(record.video_id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::CompositionScript;

    fn job() -> RenderJob {
        let script = CompositionScript {
            clips: vec![],
            overlays: vec![],
            total_duration: 0.0,
        };
        RenderJob::new(VideoId::from("v1"), "p1", "u1", script)
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let job = job();
        store.create_job(&job).await.unwrap();

        let first = store.load_job(&job.id).await.unwrap().unwrap();
        let second = store.load_job(&job.id).await.unwrap().unwrap();

        store
            .save_job(&first.value, first.version.as_deref())
            .await
            .unwrap();
        let err = store
            .save_job(&second.value, second.version.as_deref())
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_stale_assets_filtered_and_limited() {
        let store = MemoryStore::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        for i in 0..3 {
            let id = AssetId::from(format!("a{}", i));
            store.insert_asset(
                FootageAsset::new(id.clone(), "u", "p", "k").with_status(AssetStatus::PendingRetry),
            );
            store.backdate_asset(&id, old + chrono::Duration::seconds(i));
        }
        store.insert_asset(FootageAsset::new(AssetId::from("fresh"), "u", "p", "k"));

        let stale = store
            .list_stale_assets(
                &[AssetStatus::PendingRetry, AssetStatus::Uploaded],
                Utc::now() - chrono::Duration::minutes(30),
                2,
            )
            .await
            .unwrap();
        assert_eq!(stale.len(), 2);
        assert_eq!(stale[0].id.as_str(), "a0");
    }
}
