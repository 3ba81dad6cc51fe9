//! Shared data models for the vreel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Footage assets and their ingestion status
//! - Templates, slot scripts and slot assignments
//! - Composition scripts (clips and text overlays)
//! - Render jobs and their state machine
//! - The retry policy shared by every retry loop

pub mod asset;
pub mod assignment;
pub mod composition;
pub mod ids;
pub mod render_job;
pub mod retry;
pub mod template;
pub mod video;

// Re-export common types
pub use asset::{AssetOutcome, AssetStatus, FootageAsset, MediaKind};
pub use assignment::{SlotAssignment, FALLBACK_RATIONALE, NO_CANDIDATES_RATIONALE};
pub use composition::{
    latest_overlay_end, Clip, CompositionScript, FontSlant, FontWeight, OverlayError, OverlayPosition,
    OverlayStyle, TextOverlay,
};
pub use ids::{AssetId, JobId, RenderJobId, SlotId, TemplateId, VideoId};
pub use render_job::{RenderEvent, RenderJob, RenderStatus, Transition, TIMED_OUT_MESSAGE};
pub use retry::RetryPolicy;
pub use template::{parse_slot_script, RawSlot, SlotScriptPayload, Template, TemplateError, TemplateSlot};
pub use video::{RenderResult, VideoRecord, VideoStatus};
