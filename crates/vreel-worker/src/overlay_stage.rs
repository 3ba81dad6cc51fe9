//! Second-stage text burn-in.
//!
//! Downloads the first-stage render, burns the overlays with ffmpeg,
//! uploads the result and reports back through the final callback.
//! Transient failures (network, storage) fail the queue message so it is
//! redelivered; anything else is reported as a failed callback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use vreel_media::MediaResult;
use vreel_models::TextOverlay;
use vreel_queue::OverlayBurnInJob;
use vreel_render::FinalCallback;
use vreel_storage::{rendered_thumbnail_key, rendered_video_key, ObjectStorage};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// The ffmpeg operations the overlay stage needs.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn burn(&self, input: &Path, output: &Path, overlays: &[TextOverlay], work_dir: &Path) -> MediaResult<()>;

    async fn thumbnail(&self, video: &Path, output: &Path, duration: Option<f64>) -> MediaResult<()>;

    async fn probe_duration(&self, video: &Path) -> MediaResult<Option<f64>>;
}

/// [`Compositor`] backed by the ffmpeg CLI.
pub struct FfmpegCompositor;

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn burn(&self, input: &Path, output: &Path, overlays: &[TextOverlay], work_dir: &Path) -> MediaResult<()> {
        vreel_media::burn_overlays(input, output, overlays, work_dir).await
    }

    async fn thumbnail(&self, video: &Path, output: &Path, duration: Option<f64>) -> MediaResult<()> {
        vreel_media::generate_thumbnail(video, output, duration).await
    }

    async fn probe_duration(&self, video: &Path) -> MediaResult<Option<f64>> {
        vreel_media::probe_duration(video).await
    }
}

/// Second-stage overlay worker.
pub struct OverlayStage {
    storage: Arc<dyn ObjectStorage>,
    compositor: Arc<dyn Compositor>,
    http: Client,
    callback_url: String,
    work_dir: PathBuf,
}

impl OverlayStage {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        compositor: Arc<dyn Compositor>,
        callback_url: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            storage,
            compositor,
            http,
            callback_url: callback_url.into(),
            work_dir: work_dir.into(),
        })
    }

    /// Process one message and deliver its final callback.
    pub async fn run(&self, job: &OverlayBurnInJob) -> WorkerResult<FinalCallback> {
        let logger = JobLogger::new(job.job_id.as_str(), "burn_overlays");
        logger.log_start(&format!("Burning {} overlays for video {}", job.text_overlays.len(), job.video_id));

        let callback = match self.render(job, &logger).await {
            Ok(callback) => callback,
            Err(e) if e.is_retryable() => {
                logger.log_warning(&format!("Overlay stage interrupted, will be redelivered: {}", e));
                return Err(e);
            }
            Err(e) => {
                logger.log_error(&format!("Overlay stage failed: {}", e));
                FinalCallback::failed(job.video_id.clone(), job.job_id.clone(), e.to_string())
            }
        };

        self.deliver(&callback).await?;
        metrics::counter!("vreel_overlay_stage_total", "status" => callback.status.clone()).increment(1);
        logger.log_completion(&format!("Final callback delivered with status {}", callback.status));
        Ok(callback)
    }

    async fn render(&self, job: &OverlayBurnInJob, logger: &JobLogger) -> WorkerResult<FinalCallback> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("overlay-")
            .tempdir_in(&self.work_dir)?;

        let base = scratch.path().join("base.mp4");
        self.download(&job.base_video_url, &base).await?;
        logger.log_progress("Base video downloaded");

        let overlays: Vec<TextOverlay> = job
            .text_overlays
            .iter()
            .filter(|o| match o.validate(None) {
                Ok(()) => true,
                Err(e) => {
                    warn!(content = %o.content, error = %e, "Skipping malformed overlay");
                    false
                }
            })
            .cloned()
            .collect();

        let output = scratch.path().join("final.mp4");
        self.compositor
            .burn(&base, &output, &overlays, &scratch.path().join("text"))
            .await?;
        let duration = self.compositor.probe_duration(&output).await?;

        let video_key = rendered_video_key(&job.property_id, job.video_id.as_str(), job.job_id.as_str());
        self.storage.upload_file(&output, &video_key, "video/mp4").await?;
        let file_url = self.storage.playable_url(&video_key).await?;

        let thumbnail_url = match self.upload_thumbnail(job, &output, scratch.path(), duration).await {
            Ok(url) => Some(url),
            Err(e) => {
                logger.log_warning(&format!("Thumbnail failed, continuing without one: {}", e));
                None
            }
        };

        Ok(FinalCallback::completed(
            job.video_id.clone(),
            job.job_id.clone(),
            file_url,
            thumbnail_url,
            duration,
        ))
    }

    async fn upload_thumbnail(
        &self,
        job: &OverlayBurnInJob,
        video: &Path,
        scratch: &Path,
        duration: Option<f64>,
    ) -> WorkerResult<String> {
        let thumb = scratch.join("thumbnail.jpg");
        self.compositor.thumbnail(video, &thumb, duration).await?;
        let key = rendered_thumbnail_key(&job.property_id, job.video_id.as_str(), job.job_id.as_str());
        self.storage.upload_file(&thumb, &key, "image/jpeg").await?;
        Ok(self.storage.playable_url(&key).await?)
    }

    /// Stream `url` to `dest`. Client errors other than timeouts and rate
    /// limits are permanent; everything else can be retried.
    async fn download(&self, url: &str, dest: &Path) -> WorkerResult<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::download_failed(format!("GET {}: {}", url, e)))?;
        let status = response.status();
        if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            return Err(WorkerError::invalid_input(format!("base video GET {} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(WorkerError::download_failed(format!("GET {} returned {}", url, status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WorkerError::download_failed(format!("GET {}: {}", url, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn deliver(&self, callback: &FinalCallback) -> WorkerResult<()> {
        let response = self
            .http
            .post(&self.callback_url)
            .json(callback)
            .send()
            .await
            .map_err(|e| WorkerError::CallbackFailed(format!("POST {}: {}", self.callback_url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::CallbackFailed(format!(
                "POST {} returned {}",
                self.callback_url, status
            )));
        }
        info!(render_job_id = %callback.job_id, status = %callback.status, "Final callback accepted");
        Ok(())
    }
}
