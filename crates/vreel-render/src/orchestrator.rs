//! Render orchestrator.
//!
//! Drives render jobs through their state machine in response to submissions,
//! callbacks and sweeper timeouts, and surfaces results on the owning video.
//!
//! Two layers keep callbacks for one job serialized:
//! - an in-process async mutex per job around load, apply and save
//! - an update-time precondition on the save, reloaded and re-applied on
//!   conflict, for writers in other processes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, warn};

use vreel_firestore::{RenderJobStore, VideoStore};
use vreel_models::{
    RenderEvent, RenderJob, RenderJobId, RenderStatus, Transition, VideoRecord, VideoStatus,
};
use vreel_queue::{JobPublisher, OverlayBurnInJob, QueueJob};

use crate::callback::{FinalCallback, FirstStageCallback};
use crate::compiler::RenderCompiler;
use crate::engine::RenderEngine;
use crate::error::{RenderError, RenderResult};

/// Save attempts before giving up on a contended job.
pub const DEFAULT_MAX_SAVE_ATTEMPTS: u32 = 5;

const CALLBACKS_TOTAL: &str = "vreel_render_events_total";

/// Result of feeding one event to a job.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    /// The job after the event
    pub job: RenderJob,
    pub transition: Transition,
}

impl EventOutcome {
    pub fn applied(&self) -> bool {
        self.transition.is_applied()
    }

    /// Whether this event moved the job into `status`.
    fn entered(&self, status: RenderStatus) -> bool {
        matches!(self.transition, Transition::Applied { from, to } if to == status && from != status)
    }
}

fn transition_label(transition: &Transition) -> &'static str {
    match transition {
        Transition::Applied { .. } => "applied",
        Transition::IgnoredTerminal(_) => "ignored_terminal",
        Transition::IgnoredOutOfOrder(_) => "ignored_out_of_order",
    }
}

/// Render orchestrator.
pub struct RenderOrchestrator {
    jobs: Arc<dyn RenderJobStore>,
    videos: Arc<dyn VideoStore>,
    engine: Arc<dyn RenderEngine>,
    publisher: Arc<dyn JobPublisher>,
    compiler: RenderCompiler,
    locks: Mutex<HashMap<RenderJobId, Arc<tokio::sync::Mutex<()>>>>,
    max_save_attempts: u32,
}

impl RenderOrchestrator {
    pub fn new(
        jobs: Arc<dyn RenderJobStore>,
        videos: Arc<dyn VideoStore>,
        engine: Arc<dyn RenderEngine>,
        publisher: Arc<dyn JobPublisher>,
        compiler: RenderCompiler,
    ) -> Self {
        Self {
            jobs,
            videos,
            engine,
            publisher,
            compiler,
            locks: Mutex::new(HashMap::new()),
            max_save_attempts: DEFAULT_MAX_SAVE_ATTEMPTS,
        }
    }

    pub fn with_max_save_attempts(mut self, attempts: u32) -> Self {
        self.max_save_attempts = attempts.max(1);
        self
    }

    fn lock_for(&self, id: &RenderJobId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    fn release_lock(&self, id: &RenderJobId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(id);
    }

    /// Compile, persist and submit a new job.
    ///
    /// A rejected or failed submission fails the job and the video; it is not
    /// an error for the caller.
    pub async fn submit(&self, mut job: RenderJob) -> RenderResult<RenderJob> {
        let spec = self.compiler.compile_job(&job);
        job.requires_overlay_stage = spec.requires_overlay_stage;

        self.jobs.create_job(&job).await?;
        self.videos
            .upsert_video(&VideoRecord::generating(
                job.video_id.clone(),
                job.property_id.clone(),
                job.owner_id.clone(),
                job.id.clone(),
            ))
            .await?;

        let event = match self.engine.submit(&spec).await {
            Ok(external_id) => RenderEvent::Submitted { external_id },
            Err(e) => {
                warn!(render_job_id = %job.id, "Render submission failed: {}", e);
                RenderEvent::SubmissionFailed {
                    error: e.to_string(),
                }
            }
        };

        Ok(self.apply_event(&job.id, event).await?.job)
    }

    /// Handle a first-stage engine callback.
    pub async fn handle_first_stage(&self, callback: &FirstStageCallback) -> RenderResult<Option<EventOutcome>> {
        match callback.to_event() {
            Some(event) => Ok(Some(self.apply_event(&callback.job_id, event).await?)),
            None => {
                warn!(
                    render_job_id = %callback.job_id,
                    status = %callback.status,
                    "Unknown first-stage status"
                );
                Ok(None)
            }
        }
    }

    /// Handle the overlay worker's final callback.
    ///
    /// A callback naming a different video than its job is rejected before
    /// anything is applied.
    pub async fn handle_final(&self, callback: &FinalCallback) -> RenderResult<EventOutcome> {
        let job = self
            .jobs
            .load_job(&callback.job_id)
            .await?
            .ok_or_else(|| RenderError::JobNotFound(callback.job_id.to_string()))?
            .value;
        if job.video_id != callback.video_id {
            return Err(RenderError::VideoMismatch {
                job_id: job.id.to_string(),
                expected: job.video_id.to_string(),
                got: callback.video_id.to_string(),
            });
        }
        self.apply_event(&callback.job_id, callback.to_event()).await
    }

    /// Fail a job that went silent past the stuck threshold.
    pub async fn fail_stuck(&self, id: &RenderJobId) -> RenderResult<EventOutcome> {
        self.apply_event(id, RenderEvent::TimedOut).await
    }

    /// Whether `job` is still the render the video record points at.
    ///
    /// A video with no record, or no job recorded yet, belongs to anyone.
    pub async fn owns_video(&self, job: &RenderJob) -> RenderResult<bool> {
        let video = self.videos.get_video(&job.video_id).await?;
        Ok(video
            .and_then(|v| v.render_job_id)
            .map_or(true, |current| current == job.id))
    }

    /// Submit a fresh job rendering a previous job's script snapshot.
    ///
    /// Returns `None` when the video has moved on to another job since; a
    /// superseded job is failed but never re-rendered.
    pub async fn resubmit(&self, previous_id: &RenderJobId, attempt: u32) -> RenderResult<Option<RenderJob>> {
        let previous = self
            .jobs
            .load_job(previous_id)
            .await?
            .ok_or_else(|| RenderError::JobNotFound(previous_id.to_string()))?
            .value;

        if !previous.is_terminal() {
            self.fail_stuck(previous_id).await?;
        }

        if !self.owns_video(&previous).await? {
            info!(
                previous_job_id = %previous_id,
                video_id = %previous.video_id,
                "Video belongs to a newer job, not resubmitting"
            );
            return Ok(None);
        }

        let mut fresh = previous.resubmission();
        fresh.attempt = attempt.max(fresh.attempt);
        info!(
            render_job_id = %fresh.id,
            previous_job_id = %previous_id,
            attempt = fresh.attempt,
            "Resubmitting render job"
        );
        self.submit(fresh).await.map(Some)
    }

    /// Apply one event under the job's lock and run its side effects.
    pub async fn apply_event(&self, id: &RenderJobId, event: RenderEvent) -> RenderResult<EventOutcome> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let event_name = event.name();
        let mut outcome = match self.transition(id, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_not_found() {
                    self.release_lock(id);
                }
                return Err(e);
            }
        };

        if outcome.entered(RenderStatus::AwaitingOverlay) {
            let follow_up = self.hand_off_overlays(&outcome.job).await;
            outcome = self.transition(id, follow_up).await?;
        }

        counter!(
            CALLBACKS_TOTAL,
            "event" => event_name,
            "outcome" => transition_label(&outcome.transition)
        )
        .increment(1);

        match outcome.transition {
            Transition::Applied { from, to } => {
                info!(render_job_id = %id, event = event_name, %from, %to, "Render job transitioned");
            }
            Transition::IgnoredTerminal(status) => {
                info!(render_job_id = %id, event = event_name, %status, "Ignoring event for finished job");
            }
            Transition::IgnoredOutOfOrder(status) => {
                warn!(render_job_id = %id, event = event_name, %status, "Ignoring out-of-order event");
            }
        }

        if outcome.job.is_terminal() {
            self.surface(&outcome.job).await?;
            self.release_lock(id);
        }

        Ok(outcome)
    }

    /// Load, apply, conditionally save; reload and retry on a lost race.
    async fn transition(&self, id: &RenderJobId, event: RenderEvent) -> RenderResult<EventOutcome> {
        for attempt in 1..=self.max_save_attempts {
            let loaded = self
                .jobs
                .load_job(id)
                .await?
                .ok_or_else(|| RenderError::JobNotFound(id.to_string()))?;

            let mut job = loaded.value;
            let transition = job.apply(event.clone());
            if !transition.is_applied() {
                return Ok(EventOutcome { job, transition });
            }

            match self.jobs.save_job(&job, loaded.version.as_deref()).await {
                Ok(()) => return Ok(EventOutcome { job, transition }),
                Err(e) if e.is_precondition_failed() => {
                    debug!(render_job_id = %id, attempt, "Render job changed concurrently, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RenderError::ConcurrentUpdate(id.to_string()))
    }

    /// Queue the second stage; the returned event records how that went.
    async fn hand_off_overlays(&self, job: &RenderJob) -> RenderEvent {
        let Some(base_video_url) = job.base_output_url.clone() else {
            return RenderEvent::OverlayHandoffFailed {
                error: "first stage produced no output url".to_string(),
            };
        };

        let message = OverlayBurnInJob {
            job_id: job.id.clone(),
            video_id: job.video_id.clone(),
            property_id: job.property_id.clone(),
            base_video_url,
            text_overlays: job.script.overlays.clone(),
        };

        match self.publisher.publish(QueueJob::BurnOverlays(message)).await {
            Ok(message_id) => RenderEvent::OverlayQueued { message_id },
            // Already queued by an earlier delivery of the same callback.
            Err(e) if e.is_duplicate() => RenderEvent::OverlayQueued {
                message_id: String::new(),
            },
            Err(e) => {
                warn!(render_job_id = %job.id, "Second-stage handoff failed: {}", e);
                RenderEvent::OverlayHandoffFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Mirror a terminal job onto its video record.
    ///
    /// Skips records already showing this result, and records that have
    /// moved on to a newer job.
    async fn surface(&self, job: &RenderJob) -> RenderResult<()> {
        let existing = self.videos.get_video(&job.video_id).await?;
        let mut record = existing.clone().unwrap_or_else(|| {
            VideoRecord::generating(
                job.video_id.clone(),
                job.property_id.clone(),
                job.owner_id.clone(),
                job.id.clone(),
            )
        });

        if record.render_job_id.as_ref().is_some_and(|current| current != &job.id) {
            debug!(render_job_id = %job.id, video_id = %job.video_id, "Video belongs to a newer job");
            return Ok(());
        }

        match job.status {
            RenderStatus::Complete => {
                record.status = VideoStatus::Ready;
                record.file_url = job.output_url.clone();
                record.thumbnail_url = job.thumbnail_url.clone().or(record.thumbnail_url);
                record.duration = job.duration.or(record.duration);
                record.error_message = None;
            }
            RenderStatus::Failed => {
                record.status = VideoStatus::Failed;
                record.error_message = job.error_message.clone();
            }
            _ => return Ok(()),
        }
        record.render_job_id = Some(job.id.clone());

        let unchanged = existing.as_ref().is_some_and(|e| {
            e.status == record.status
                && e.file_url == record.file_url
                && e.thumbnail_url == record.thumbnail_url
                && e.duration == record.duration
                && e.error_message == record.error_message
        });
        if unchanged {
            return Ok(());
        }

        record.updated_at = Utc::now();
        self.videos.upsert_video(&record).await?;
        Ok(())
    }
}
