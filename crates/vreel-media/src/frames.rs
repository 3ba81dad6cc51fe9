//! Frame sampling for content description.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Width frames are scaled to before being sent for description.
pub const SAMPLE_FRAME_WIDTH: u32 = 768;

/// Seek positions used when the duration is unknown.
const BLIND_SAMPLE_POSITIONS: [f64; 3] = [0.5, 1.5, 3.0];

/// Timestamps for `count` frames spread across the clip.
///
/// With a known duration the frames sit at the centers of `count` equal
/// segments, so neither the first nor the last frame lands on a fade.
pub fn sample_timestamps(duration: Option<f64>, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    match duration {
        Some(d) if d.is_finite() && d > 0.0 => (0..count)
            .map(|i| d * (i as f64 + 0.5) / count as f64)
            .collect(),
        _ => (0..count)
            .map(|i| {
                BLIND_SAMPLE_POSITIONS
                    .get(i)
                    .copied()
                    .unwrap_or(i as f64 * 1.5)
            })
            .collect(),
    }
}

/// Extract one JPEG frame at `at` seconds, scaled to `width`.
pub async fn extract_frame(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    at: f64,
    width: u32,
) -> MediaResult<()> {
    let output_path = output_path.as_ref();
    let cmd = FfmpegCommand::new(video_path, output_path)
        .seek(at.max(0.0))
        .single_frame()
        .video_filter(format!("scale={}:-2", width))
        .jpeg_quality(3);

    FfmpegRunner::new().with_timeout(120).run(&cmd).await?;

    // Seeking past the end exits cleanly without writing anything.
    if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
        return Err(MediaError::ffmpeg_failed(
            format!("no frame decoded at {:.3}s", at),
            None,
            None,
        ));
    }
    Ok(())
}

/// Sample `count` frames into `out_dir`.
///
/// Individual frames may fail (short clips, seek past end). The call only
/// fails when no frame at all could be decoded.
pub async fn sample_frames(
    video_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    duration: Option<f64>,
    count: usize,
) -> MediaResult<Vec<PathBuf>> {
    let video_path = video_path.as_ref();
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let mut frames = Vec::with_capacity(count);
    for (i, at) in sample_timestamps(duration, count).into_iter().enumerate() {
        let path = out_dir.join(format!("frame_{:02}.jpg", i));
        match extract_frame(video_path, &path, at, SAMPLE_FRAME_WIDTH).await {
            Ok(()) => frames.push(path),
            Err(MediaError::FfmpegNotFound) => return Err(MediaError::FfmpegNotFound),
            Err(e) => warn!(at, error = %e, "Frame sample failed"),
        }
    }

    if frames.is_empty() {
        return Err(MediaError::NoFrames(video_path.to_path_buf()));
    }

    debug!(count = frames.len(), "Sampled frames");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_spread_across_clip() {
        let ts = sample_timestamps(Some(12.0), 3);
        assert_eq!(ts, vec![2.0, 6.0, 10.0]);
    }

    #[test]
    fn test_timestamps_without_duration() {
        assert_eq!(sample_timestamps(None, 2), vec![0.5, 1.5]);
        assert_eq!(sample_timestamps(Some(f64::NAN), 3), vec![0.5, 1.5, 3.0]);
        assert!(sample_timestamps(Some(5.0), 0).is_empty());
    }
}
