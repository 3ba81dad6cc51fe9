//! Text overlay burn-in with FFmpeg's `drawtext` filter.
//!
//! Overlay text is written to side files and referenced with `textfile=` so
//! user content never has to survive filtergraph escaping.

use std::path::{Path, PathBuf};
use tracing::info;
use vreel_models::{FontSlant, FontWeight, TextOverlay};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Escape a value for use inside a single-quoted filter option.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '\'' | ':' | ',' | ';' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn font_pattern(overlay: &TextOverlay) -> String {
    let mut pattern = overlay.style.font_family.trim().to_string();
    if pattern.is_empty() {
        pattern = "sans".to_string();
    }
    if overlay.style.weight == FontWeight::Bold {
        pattern.push_str(":weight=bold");
    }
    if overlay.style.slant == FontSlant::Italic {
        pattern.push_str(":slant=italic");
    }
    pattern
}

/// Build one `drawtext` stage for an overlay whose text lives in `text_file`.
pub fn drawtext_stage(overlay: &TextOverlay, text_file: &Path) -> String {
    let anchor = overlay.anchor();
    format!(
        "drawtext=textfile='{file}':font='{font}':fontsize={size}:fontcolor={color}:\
         x=w*{x:.4}-text_w/2:y=h*{y:.4}-text_h/2:enable='between(t,{start:.3},{end:.3})'",
        file = escape_filter_value(&text_file.to_string_lossy()),
        font = escape_filter_value(&font_pattern(overlay)),
        size = overlay.style.size,
        color = overlay.style.hex_color().replace('#', "0x"),
        x = anchor.x / 100.0,
        y = anchor.y / 100.0,
        start = overlay.start_time,
        end = overlay.end_time,
    )
}

/// Build the full filter chain for a set of overlays.
pub fn drawtext_filter(overlays: &[TextOverlay], text_files: &[PathBuf]) -> String {
    overlays
        .iter()
        .zip(text_files)
        .map(|(o, f)| drawtext_stage(o, f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Burn `overlays` into `input`, writing `output`.
///
/// Overlays are expected to be validated already. With no overlays the video
/// is still re-encoded so the output is always a fresh file.
pub async fn burn_overlays(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    overlays: &[TextOverlay],
    work_dir: impl AsRef<Path>,
) -> MediaResult<()> {
    let work_dir = work_dir.as_ref();
    tokio::fs::create_dir_all(work_dir).await?;

    let mut text_files = Vec::with_capacity(overlays.len());
    for (i, overlay) in overlays.iter().enumerate() {
        let path = work_dir.join(format!("overlay_{:02}.txt", i));
        tokio::fs::write(&path, overlay.content.as_bytes()).await?;
        text_files.push(path);
    }

    let mut cmd = FfmpegCommand::new(input, output);
    if !overlays.is_empty() {
        cmd = cmd.video_filter(drawtext_filter(overlays, &text_files));
    }
    let cmd = cmd
        .video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .audio_codec("copy")
        .output_arg("-movflags")
        .output_arg("+faststart");

    info!(overlays = overlays.len(), "Burning text overlays");
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("a:b'c"), "a\\:b\\'c");
        assert_eq!(escape_filter_value("/tmp/x.txt"), "/tmp/x.txt");
    }

    #[test]
    fn test_drawtext_stage() {
        let mut overlay = TextOverlay::new("Pool day", 1.0, 2.5).at(50.0, 80.0);
        overlay.style.color = "#fff".into();
        overlay.style.slant = FontSlant::Italic;

        let stage = drawtext_stage(&overlay, Path::new("/tmp/w/overlay_00.txt"));
        assert!(stage.starts_with("drawtext=textfile='/tmp/w/overlay_00.txt'"));
        assert!(stage.contains("font='Inter\\:weight=bold\\:slant=italic'"));
        assert!(stage.contains("fontcolor=0xFFFFFF"));
        assert!(stage.contains("x=w*0.5000-text_w/2"));
        assert!(stage.contains("y=h*0.8000-text_h/2"));
        assert!(stage.contains("enable='between(t,1.000,2.500)'"));
    }

    #[test]
    fn test_filter_chain_joins_stages() {
        let overlays = vec![
            TextOverlay::new("One", 0.0, 1.0),
            TextOverlay::new("Two", 1.0, 2.0),
        ];
        let files = vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")];
        let filter = drawtext_filter(&overlays, &files);
        assert_eq!(filter.matches("drawtext=").count(), 2);
        assert!(filter.contains(")',drawtext="));
    }
}
