//! Footage pipeline worker.
//!
//! This crate provides:
//! - Footage ingestion: frame sampling, vision descriptions with retry, thumbnails
//! - Slot matching with a deterministic scorer and an optional Gemini strategy
//! - Composition script building and render submission
//! - The second-stage overlay burn-in
//! - The retry sweeper and the queue executor

pub mod config;
pub mod error;
pub mod executor;
pub mod gemini;
pub mod generate;
pub mod ingest;
pub mod logging;
pub mod matching;
pub mod overlay_stage;
pub mod retry;
pub mod script;
pub mod sweeper;
pub mod vision;

#[cfg(test)]
mod test_support;

pub use config::{MatchingMode, SweepConfig, WorkerConfig};
pub use error::{AiError, WorkerError, WorkerResult};
pub use executor::{JobExecutor, PipelineContext};
pub use generate::Generator;
pub use ingest::{FfmpegFrames, FrameSource, Ingestor};
pub use logging::JobLogger;
pub use matching::{rank_templates, MatchEngine, MatchStrategy, RankedTemplate};
pub use overlay_stage::{Compositor, FfmpegCompositor, OverlayStage};
pub use script::ScriptBuilder;
pub use sweeper::{SweepReport, Sweeper};
pub use vision::{GeminiVision, VisionAnalyzer};
