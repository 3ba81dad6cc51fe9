//! Render jobs and the orchestrator state machine.
//!
//! Transitions are pure: [`RenderJob::apply`] takes an event and either
//! mutates the job or reports why the event was ignored. Persistence and
//! locking live in the orchestrator.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CompositionScript, RenderJobId, VideoId};

/// Error message recorded when the sweeper gives up on a silent job.
pub const TIMED_OUT_MESSAGE: &str = "render timed out without a callback";

/// Render job lifecycle.
///
/// `queued → submitted → rendering → (awaiting_overlay) → complete | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    #[default]
    Queued,
    Submitted,
    Rendering,
    AwaitingOverlay,
    Complete,
    Failed,
}

impl RenderStatus {
    pub const NON_TERMINAL: [RenderStatus; 4] = [
        RenderStatus::Queued,
        RenderStatus::Submitted,
        RenderStatus::Rendering,
        RenderStatus::AwaitingOverlay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Queued => "queued",
            RenderStatus::Submitted => "submitted",
            RenderStatus::Rendering => "rendering",
            RenderStatus::AwaitingOverlay => "awaiting_overlay",
            RenderStatus::Complete => "complete",
            RenderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RenderStatus::Queued),
            "submitted" => Some(RenderStatus::Submitted),
            "rendering" => Some(RenderStatus::Rendering),
            "awaiting_overlay" => Some(RenderStatus::AwaitingOverlay),
            "complete" => Some(RenderStatus::Complete),
            "failed" => Some(RenderStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Complete | RenderStatus::Failed)
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a render job.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// The engine accepted the submission.
    Submitted { external_id: String },
    /// The engine rejected the submission or was unreachable.
    SubmissionFailed { error: String },
    /// First-stage PROGRESSING callback.
    Progressing,
    /// First-stage COMPLETE callback.
    FirstStageComplete { output_url: String },
    /// The second-stage message was queued.
    OverlayQueued { message_id: String },
    /// The second-stage message could not be queued.
    OverlayHandoffFailed { error: String },
    /// Final callback reporting success.
    FinalComplete {
        file_url: String,
        thumbnail_url: Option<String>,
        duration: Option<f64>,
    },
    /// Explicit error from either stage.
    Failed { error: String },
    /// No callback arrived within the stuck threshold.
    TimedOut,
}

impl RenderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RenderEvent::Submitted { .. } => "submitted",
            RenderEvent::SubmissionFailed { .. } => "submission_failed",
            RenderEvent::Progressing => "progressing",
            RenderEvent::FirstStageComplete { .. } => "first_stage_complete",
            RenderEvent::OverlayQueued { .. } => "overlay_queued",
            RenderEvent::OverlayHandoffFailed { .. } => "overlay_handoff_failed",
            RenderEvent::FinalComplete { .. } => "final_complete",
            RenderEvent::Failed { .. } => "failed",
            RenderEvent::TimedOut => "timed_out",
        }
    }
}

/// Outcome of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job changed state (or recorded data without changing state).
    Applied { from: RenderStatus, to: RenderStatus },
    /// The job is terminal; the event was a duplicate or arrived late.
    IgnoredTerminal(RenderStatus),
    /// The event is not valid from the current state.
    IgnoredOutOfOrder(RenderStatus),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// A render job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    pub id: RenderJobId,
    pub video_id: VideoId,
    pub property_id: String,
    pub owner_id: String,
    /// Snapshot of the script this job renders
    pub script: CompositionScript,
    #[serde(default)]
    pub status: RenderStatus,
    /// Whether a second-stage text burn-in is needed
    #[serde(default)]
    pub requires_overlay_stage: bool,
    /// Engine job id for the first stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_stage_job_id: Option<String>,
    /// Queue message id of the second stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_stage_job_id: Option<String>,
    /// First-stage output, before overlays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_output_url: Option<String>,
    /// Final playable output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Resubmission generation, starting at 1
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    /// Job this one was resubmitted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_job_id: Option<RenderJobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn first_attempt() -> u32 {
    1
}

impl RenderJob {
    pub fn new(
        video_id: VideoId,
        property_id: impl Into<String>,
        owner_id: impl Into<String>,
        script: CompositionScript,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RenderJobId::new(),
            video_id,
            property_id: property_id.into(),
            owner_id: owner_id.into(),
            script,
            status: RenderStatus::Queued,
            requires_overlay_stage: false,
            first_stage_job_id: None,
            second_stage_job_id: None,
            base_output_url: None,
            output_url: None,
            thumbnail_url: None,
            duration: None,
            error_message: None,
            attempt: 1,
            previous_job_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh queued job rendering the same script snapshot.
    pub fn resubmission(&self) -> Self {
        let mut job = RenderJob::new(
            self.video_id.clone(),
            self.property_id.clone(),
            self.owner_id.clone(),
            self.script.clone(),
        );
        job.attempt = self.attempt + 1;
        job.previous_job_id = Some(self.id.clone());
        job
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the job has gone without an update for longer than `threshold_secs`.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        !self.is_terminal() && (now - self.updated_at).num_seconds() > threshold_secs
    }

    fn fail(&mut self, error: String) -> RenderStatus {
        self.error_message = Some(error);
        RenderStatus::Failed
    }

    /// Apply an event.
    ///
    /// Terminal jobs ignore everything, so a duplicate callback leaves the
    /// record exactly as the first delivery did.
    pub fn apply(&mut self, event: RenderEvent) -> Transition {
        use RenderEvent as E;
        use RenderStatus as S;

        let from = self.status;
        if from.is_terminal() {
            return Transition::IgnoredTerminal(from);
        }

        let to = match (from, event) {
            (S::Queued, E::Submitted { external_id }) => {
                self.first_stage_job_id = Some(external_id);
                S::Submitted
            }
            // The engine may call back before its submit response is recorded.
            (S::Submitted | S::Rendering | S::AwaitingOverlay, E::Submitted { external_id }) => {
                self.first_stage_job_id.get_or_insert(external_id);
                from
            }
            (S::Queued, E::SubmissionFailed { error }) => self.fail(error),
            (S::Queued | S::Submitted, E::Progressing) => S::Rendering,
            (S::Queued | S::Submitted | S::Rendering, E::FirstStageComplete { output_url }) => {
                if self.requires_overlay_stage {
                    self.base_output_url = Some(output_url);
                    S::AwaitingOverlay
                } else {
                    self.output_url = Some(output_url);
                    S::Complete
                }
            }
            (S::AwaitingOverlay, E::OverlayQueued { message_id }) => {
                self.second_stage_job_id = Some(message_id);
                S::AwaitingOverlay
            }
            (S::AwaitingOverlay, E::OverlayHandoffFailed { error }) => {
                self.fail(format!("second-stage handoff failed: {}", error))
            }
            (
                S::Submitted | S::Rendering | S::AwaitingOverlay,
                E::FinalComplete {
                    file_url,
                    thumbnail_url,
                    duration,
                },
            ) => {
                self.output_url = Some(file_url);
                self.thumbnail_url = thumbnail_url;
                self.duration = duration;
                S::Complete
            }
            (_, E::Failed { error }) => self.fail(error),
            (_, E::TimedOut) => self.fail(TIMED_OUT_MESSAGE.to_string()),
            _ => return Transition::IgnoredOutOfOrder(from),
        };

        self.status = to;
        self.updated_at = Utc::now();
        Transition::Applied { from, to }
    }
}
