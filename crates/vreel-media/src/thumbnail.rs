//! Thumbnail generation.

use std::path::Path;

use crate::error::MediaResult;
use crate::frames::extract_frame;

/// Thumbnail width in pixels; height keeps the aspect ratio.
pub const THUMBNAIL_WIDTH: u32 = 480;

/// Seek position for thumbnails when nothing better is known.
pub const THUMBNAIL_DEFAULT_AT: f64 = 1.0;

/// Where to take a thumbnail for a clip of the given duration.
pub fn thumbnail_position(duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d.is_finite() && d > 0.0 => (d / 2.0).min(THUMBNAIL_DEFAULT_AT.max(d * 0.25)),
        _ => THUMBNAIL_DEFAULT_AT,
    }
}

/// Generate a thumbnail from a video file with a single-frame extraction.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    duration: Option<f64>,
) -> MediaResult<()> {
    extract_frame(
        video_path,
        output_path,
        thumbnail_position(duration),
        THUMBNAIL_WIDTH,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_position() {
        assert_eq!(thumbnail_position(None), 1.0);
        assert_eq!(thumbnail_position(Some(1.0)), 0.5);
        assert_eq!(thumbnail_position(Some(20.0)), 5.0);
    }
}
