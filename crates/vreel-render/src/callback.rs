//! Callback payloads from the render engine and the overlay worker.

use serde::{Deserialize, Serialize};

use vreel_models::{RenderEvent, RenderJobId, VideoId};

/// Statuses the final callback treats as success.
const FINAL_SUCCESS_STATUSES: [&str; 4] = ["complete", "completed", "success", "done"];

/// First-stage callback from the render engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstStageCallback {
    pub job_id: RenderJobId,
    /// `COMPLETE`, `ERROR` or `PROGRESSING`
    pub status: String,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl FirstStageCallback {
    /// The event this callback stands for; `None` for an unknown status.
    pub fn to_event(&self) -> Option<RenderEvent> {
        match self.status.trim().to_ascii_uppercase().as_str() {
            "PROGRESSING" => Some(RenderEvent::Progressing),
            "COMPLETE" => Some(match self.output_url.as_deref().filter(|u| !u.is_empty()) {
                Some(url) => RenderEvent::FirstStageComplete {
                    output_url: url.to_string(),
                },
                None => RenderEvent::Failed {
                    error: "render engine reported completion without an output url".to_string(),
                },
            }),
            "ERROR" => Some(RenderEvent::Failed {
                error: self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "render engine reported an error".to_string()),
            }),
            _ => None,
        }
    }
}

/// Final callback from the second-stage overlay worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCallback {
    pub video_id: VideoId,
    pub job_id: RenderJobId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FinalCallback {
    pub fn completed(
        video_id: VideoId,
        job_id: RenderJobId,
        file_url: String,
        thumbnail_url: Option<String>,
        duration: Option<f64>,
    ) -> Self {
        Self {
            video_id,
            job_id,
            status: "complete".to_string(),
            file_url: Some(file_url),
            thumbnail_url,
            duration,
            error_message: None,
        }
    }

    pub fn failed(video_id: VideoId, job_id: RenderJobId, error: impl Into<String>) -> Self {
        Self {
            video_id,
            job_id,
            status: "failed".to_string(),
            file_url: None,
            thumbnail_url: None,
            duration: None,
            error_message: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        FINAL_SUCCESS_STATUSES.contains(&status.as_str())
    }

    pub fn to_event(&self) -> RenderEvent {
        if !self.is_success() {
            return RenderEvent::Failed {
                error: self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("overlay stage reported status '{}'", self.status)),
            };
        }
        match self.file_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => RenderEvent::FinalComplete {
                file_url: url.to_string(),
                thumbnail_url: self.thumbnail_url.clone(),
                duration: self.duration,
            },
            None => RenderEvent::Failed {
                error: "overlay stage reported success without a file url".to_string(),
            },
        }
    }
}
