//! Render orchestration.
//!
//! This crate provides:
//! - Compilation of composition scripts into engine job specs
//!   (frame-accurate timecodes, TTML caption documents)
//! - The render engine client
//! - Callback payloads for both render stages
//! - The orchestrator that drives render jobs to a terminal state

pub mod callback;
pub mod captions;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod font;
pub mod orchestrator;
pub mod timecode;

pub use callback::{FinalCallback, FirstStageCallback};
pub use captions::{build_caption_document, CaptionDocument, FrameSize, Region};
pub use compiler::{ClipInput, CompilerConfig, JobMetadata, RenderCompiler, RenderJobSpec};
pub use engine::{EngineConfig, HttpRenderEngine, RenderEngine};
pub use error::{RenderError, RenderResult};
pub use font::FontCategory;
pub use orchestrator::{EventOutcome, RenderOrchestrator, DEFAULT_MAX_SAVE_ATTEMPTS};
pub use timecode::{clock_time, frames_to_timecode, seconds_to_frames, DEFAULT_FRAME_RATE};
