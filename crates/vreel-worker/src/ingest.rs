//! Footage ingestion.
//!
//! Download → probe → sample frames → describe (with retry) → thumbnail →
//! one masked update. The only earlier write is the `processing` claim.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use vreel_firestore::AssetStore;
use vreel_media::{MediaError, MediaResult};
use vreel_models::{AssetId, AssetOutcome, AssetStatus, FootageAsset, RetryPolicy};
use vreel_storage::{asset_thumbnail_key, ObjectStorage};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::describe_with_retry;
use crate::vision::VisionAnalyzer;

/// Local media operations ingestion needs.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn probe_duration(&self, video: &Path) -> MediaResult<Option<f64>>;

    /// Sample `count` JPEG frames spread across the clip into `out_dir`.
    async fn sample_frames(
        &self,
        video: &Path,
        out_dir: &Path,
        duration: Option<f64>,
        count: usize,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Independent single-frame thumbnail extraction.
    async fn thumbnail(&self, video: &Path, output: &Path, duration: Option<f64>) -> MediaResult<()>;
}

/// [`FrameSource`] on the ffmpeg CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegFrames;

#[async_trait]
impl FrameSource for FfmpegFrames {
    async fn probe_duration(&self, video: &Path) -> MediaResult<Option<f64>> {
        vreel_media::probe_duration(video).await
    }

    async fn sample_frames(
        &self,
        video: &Path,
        out_dir: &Path,
        duration: Option<f64>,
        count: usize,
    ) -> MediaResult<Vec<PathBuf>> {
        vreel_media::sample_frames(video, out_dir, duration, count).await
    }

    async fn thumbnail(&self, video: &Path, output: &Path, duration: Option<f64>) -> MediaResult<()> {
        vreel_media::generate_thumbnail(video, output, duration).await
    }
}

/// Footage ingestion worker.
pub struct Ingestor {
    assets: Arc<dyn AssetStore>,
    storage: Arc<dyn ObjectStorage>,
    frames: Arc<dyn FrameSource>,
    vision: Arc<dyn VisionAnalyzer>,
    policy: RetryPolicy,
    frame_count: usize,
    work_dir: PathBuf,
}

impl Ingestor {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        storage: Arc<dyn ObjectStorage>,
        frames: Arc<dyn FrameSource>,
        vision: Arc<dyn VisionAnalyzer>,
        policy: RetryPolicy,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            assets,
            storage,
            frames,
            vision,
            policy,
            frame_count: 3,
            work_dir: work_dir.into(),
        }
    }

    pub fn with_frame_count(mut self, count: usize) -> Self {
        self.frame_count = count.clamp(2, 3);
        self
    }

    /// Ingest one asset.
    ///
    /// Storage and decoding failures end in `error`; a missing description
    /// ends in `pending_retry`. A transient download failure reverts the
    /// claim and returns an error so the message is redelivered.
    pub async fn ingest(&self, asset_id: &AssetId) -> WorkerResult<AssetOutcome> {
        let asset = self
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| WorkerError::AssetNotFound(asset_id.to_string()))?;

        if matches!(asset.status, AssetStatus::Ready | AssetStatus::Error) {
            info!(asset_id = %asset_id, status = %asset.status, "Asset already settled, skipping");
            return Ok(AssetOutcome {
                status: asset.status,
                duration: asset.duration,
                description: asset.description.clone(),
                thumbnail_key: asset.thumbnail_key.clone(),
                attempts: 0,
            });
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("ingest-{}-", asset_id))
            .tempdir_in(&self.work_dir)?;

        self.assets.set_asset_status(asset_id, AssetStatus::Processing).await?;

        let outcome = match self.run(&asset, scratch.path()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(asset_id = %asset_id, "Ingestion attempt failed: {}", e);
                if let Err(revert) = self.assets.set_asset_status(asset_id, AssetStatus::Uploaded).await {
                    warn!(asset_id = %asset_id, "Failed to revert processing claim: {}", revert);
                }
                return Err(e);
            }
        };

        self.assets.apply_outcome(asset_id, &outcome).await?;
        counter!("vreel_ingest_outcomes_total", "status" => outcome.status.as_str()).increment(1);
        info!(
            asset_id = %asset_id,
            status = %outcome.status,
            attempts = outcome.attempts,
            duration = ?outcome.duration,
            "Ingestion finished"
        );
        Ok(outcome)
    }

    /// Everything between the claim and the final write. `Err` only for
    /// transient failures; permanent ones come back as an `error` outcome.
    async fn run(&self, asset: &FootageAsset, scratch: &Path) -> WorkerResult<AssetOutcome> {
        let video = scratch.join("source");
        if let Err(e) = self.storage.download_file(&asset.storage_key, &video).await {
            if e.is_not_found() {
                warn!(asset_id = %asset.id, key = %asset.storage_key, "Source object missing");
                return Ok(AssetOutcome::failed(None));
            }
            return Err(WorkerError::download_failed(e.to_string()));
        }

        let duration = match self.frames.probe_duration(&video).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!(asset_id = %asset.id, "Duration probe failed: {}", e);
                None
            }
        };

        let frames = match self
            .frames
            .sample_frames(&video, &scratch.join("frames"), duration, self.frame_count)
            .await
        {
            Ok(frames) => frames,
            Err(e) if e.is_decode_failure() => {
                warn!(asset_id = %asset.id, "Frames could not be decoded: {}", e);
                return Ok(AssetOutcome::failed(duration));
            }
            Err(e) => return Err(e.into()),
        };

        let described = describe_with_retry(self.vision.as_ref(), &frames, &self.policy).await;

        let thumbnail = match described.description {
            Some(_) => middle_frame(&frames),
            None => self.extract_thumbnail(&video, scratch, duration, &frames).await,
        };
        let Some(thumbnail) = thumbnail else {
            return Ok(AssetOutcome::failed(duration));
        };

        let key = asset_thumbnail_key(&asset.property_id, asset.id.as_str());
        if let Err(e) = self.storage.upload_file(&thumbnail, &key, "image/jpeg").await {
            warn!(asset_id = %asset.id, "Thumbnail upload failed: {}", e);
            return Ok(AssetOutcome::failed(duration));
        }

        Ok(AssetOutcome::from_results(
            duration,
            described.description,
            Some(key),
            described.attempts,
        ))
    }

    async fn extract_thumbnail(
        &self,
        video: &Path,
        scratch: &Path,
        duration: Option<f64>,
        frames: &[PathBuf],
    ) -> Option<PathBuf> {
        let output = scratch.join("thumbnail.jpg");
        match self.frames.thumbnail(video, &output, duration).await {
            Ok(()) => Some(output),
            Err(MediaError::FfmpegNotFound) => None,
            Err(e) => {
                warn!("Thumbnail extraction failed, reusing a sampled frame: {}", e);
                middle_frame(frames)
            }
        }
    }
}

fn middle_frame(frames: &[PathBuf]) -> Option<PathBuf> {
    frames.get(frames.len() / 2).cloned()
}
