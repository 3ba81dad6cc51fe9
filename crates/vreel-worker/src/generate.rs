//! Video generation: slots → assignments → script → render submission.

use std::sync::Arc;

use tracing::{info, warn};

use vreel_firestore::{AssetStore, VideoStore};
use vreel_models::{parse_slot_script, RenderJob, VideoRecord};
use vreel_queue::{GenerateVideoJob, ResubmitRenderJob};
use vreel_render::RenderOrchestrator;

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::matching::MatchEngine;
use crate::script::ScriptBuilder;

/// Runs generation and resubmission jobs.
pub struct Generator {
    assets: Arc<dyn AssetStore>,
    videos: Arc<dyn VideoStore>,
    matcher: MatchEngine,
    scripts: ScriptBuilder,
    orchestrator: Arc<RenderOrchestrator>,
}

impl Generator {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        videos: Arc<dyn VideoStore>,
        matcher: MatchEngine,
        scripts: ScriptBuilder,
        orchestrator: Arc<RenderOrchestrator>,
    ) -> Self {
        Self {
            assets,
            videos,
            matcher,
            scripts,
            orchestrator,
        }
    }

    /// Match, build and submit one video.
    ///
    /// Returns `None` when the request itself is unusable; the video record
    /// is marked failed and the message should not be retried.
    pub async fn generate(&self, job: &GenerateVideoJob) -> WorkerResult<Option<RenderJob>> {
        let logger = JobLogger::new(job.job_id.as_str(), "generate_video");
        logger.log_start(&format!("Generating video {} for property {}", job.video_id, job.property_id));

        let slots = match parse_slot_script(job.slot_script.clone()) {
            Ok(slots) => slots,
            Err(e) => {
                logger.log_error(&format!("Unusable slot script: {}", e));
                self.fail_video(job, format!("invalid slot script: {}", e)).await?;
                return Ok(None);
            }
        };

        let candidates = self.assets.list_ready_assets(&job.property_id).await?;
        let assignments = match &job.manual_assignments {
            Some(manual) => {
                logger.log_progress(&format!("Using {} hand-edited assignments", manual.len()));
                manual.clone()
            }
            None => self.matcher.run(&candidates, &slots).await?,
        };

        let script = self
            .scripts
            .build(
                &assignments,
                &slots,
                &job.text_overlays,
                &candidates,
                job.manual_total_duration,
            )
            .await;

        if script.clips.is_empty() {
            logger.log_warning("No playable clips for any slot");
            self.fail_video(job, "no usable footage for this template").await?;
            return Ok(None);
        }

        let render_job = RenderJob::new(
            job.video_id.clone(),
            job.property_id.clone(),
            job.owner_id.clone(),
            script,
        );
        let submitted = self.orchestrator.submit(render_job).await?;

        logger.log_completion(&format!(
            "Render job {} is {} ({} clips)",
            submitted.id,
            submitted.status,
            submitted.script.clips.len()
        ));
        Ok(Some(submitted))
    }

    /// Render a timed-out job's script again.
    ///
    /// `None` when the video already moved on to a newer job.
    pub async fn resubmit(&self, job: &ResubmitRenderJob) -> WorkerResult<Option<RenderJob>> {
        let Some(fresh) = self
            .orchestrator
            .resubmit(&job.previous_job_id, job.attempt)
            .await?
        else {
            return Ok(None);
        };
        info!(
            previous_job_id = %job.previous_job_id,
            render_job_id = %fresh.id,
            attempt = fresh.attempt,
            "Render job resubmitted"
        );
        Ok(Some(fresh))
    }

    async fn fail_video(&self, job: &GenerateVideoJob, error: impl Into<String>) -> WorkerResult<()> {
        let error = error.into();
        warn!(video_id = %job.video_id, error = %error, "Video generation failed");
        self.videos
            .upsert_video(&VideoRecord::failed(
                job.video_id.clone(),
                job.property_id.clone(),
                job.owner_id.clone(),
                error,
            ))
            .await?;
        Ok(())
    }
}
