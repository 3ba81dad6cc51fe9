//! The owning video record that render results are surfaced to.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{RenderJobId, VideoId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Generating,
    Ready,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Generating => "generating",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generating" => Some(VideoStatus::Generating),
            "ready" => Some(VideoStatus::Ready),
            "failed" => Some(VideoStatus::Failed),
            _ => None,
        }
    }
}

/// A generated video as the rest of the product sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    pub video_id: VideoId,
    pub property_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub status: VideoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_job_id: Option<RenderJobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn generating(
        video_id: VideoId,
        property_id: impl Into<String>,
        owner_id: impl Into<String>,
        render_job_id: RenderJobId,
    ) -> Self {
        Self {
            video_id,
            property_id: property_id.into(),
            owner_id: owner_id.into(),
            status: VideoStatus::Generating,
            file_url: None,
            thumbnail_url: None,
            duration: None,
            render_job_id: Some(render_job_id),
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// A video that failed before any render job existed.
    pub fn failed(
        video_id: VideoId,
        property_id: impl Into<String>,
        owner_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            video_id,
            property_id: property_id.into(),
            owner_id: owner_id.into(),
            status: VideoStatus::Failed,
            file_url: None,
            thumbnail_url: None,
            duration: None,
            render_job_id: None,
            error_message: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}

/// What a finished render reports back to the video record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    pub render_job_id: RenderJobId,
    pub file_url: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<f64>,
}
