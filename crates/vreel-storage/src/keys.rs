//! Object key layout.
//!
//! Everything the pipeline writes lives under `properties/{property_id}/`.

use std::path::Path;

/// Thumbnail for an ingested asset.
pub fn asset_thumbnail_key(property_id: &str, asset_id: &str) -> String {
    format!("properties/{}/thumbnails/{}.jpg", property_id, asset_id)
}

/// Final rendered video for one render job.
pub fn rendered_video_key(property_id: &str, video_id: &str, render_job_id: &str) -> String {
    format!("properties/{}/videos/{}/{}.mp4", property_id, video_id, render_job_id)
}

/// Thumbnail of a rendered video.
pub fn rendered_thumbnail_key(property_id: &str, video_id: &str, render_job_id: &str) -> String {
    format!("properties/{}/videos/{}/{}.jpg", property_id, video_id, render_job_id)
}

/// Content type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(asset_thumbnail_key("p1", "a1"), "properties/p1/thumbnails/a1.jpg");
        assert_eq!(rendered_video_key("p1", "v1", "r1"), "properties/p1/videos/v1/r1.mp4");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("x/out.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("thumb.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
