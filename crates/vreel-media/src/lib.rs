//! FFmpeg CLI wrapper for footage processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - Container probing with optional duration
//! - Frame sampling for content description
//! - Single-frame thumbnails
//! - `drawtext` burn-in of timed text overlays

pub mod command;
pub mod error;
pub mod frames;
pub mod overlay;
pub mod probe;
pub mod thumbnail;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frame, sample_frames, sample_timestamps};
pub use overlay::{burn_overlays, drawtext_filter};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use thumbnail::{generate_thumbnail, THUMBNAIL_WIDTH};
