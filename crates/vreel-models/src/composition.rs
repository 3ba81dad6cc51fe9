//! Composition scripts: the ordered clip list plus text overlays that a
//! render job is compiled from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AssetId;

/// Largest overlay font size accepted, in pixels.
pub const MAX_OVERLAY_SIZE: u32 = 400;

/// One trimmed source clip on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub source_asset: AssetId,
    pub source_url: String,
    /// Trim start within the source (seconds)
    pub trim_start: f64,
    /// Trim end within the source (seconds)
    pub trim_end: f64,
    pub duration: f64,
    pub order: u32,
}

/// Overlay anchor point, as percentages (0-100) of the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayPosition {
    pub x: f64,
    pub y: f64,
}

impl OverlayPosition {
    pub fn center() -> Self {
        Self { x: 50.0, y: 50.0 }
    }

    fn in_range(v: f64) -> bool {
        v.is_finite() && (0.0..=100.0).contains(&v)
    }

    pub fn is_valid(&self) -> bool {
        Self::in_range(self.x) && Self::in_range(self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    Normal,
    #[default]
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FontSlant {
    #[default]
    Normal,
    Italic,
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

fn default_size() -> u32 {
    64
}

fn default_font() -> String {
    "Inter".to_string()
}

/// Visual style of an overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayStyle {
    #[serde(default = "default_color")]
    pub color: String,
    /// Font size in pixels
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_font")]
    pub font_family: String,
    #[serde(default)]
    pub weight: FontWeight,
    #[serde(default)]
    pub slant: FontSlant,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: default_color(),
            size: default_size(),
            font_family: default_font(),
            weight: FontWeight::default(),
            slant: FontSlant::default(),
        }
    }
}

const NAMED_COLORS: [(&str, &str); 8] = [
    ("white", "#FFFFFF"),
    ("black", "#000000"),
    ("red", "#FF0000"),
    ("green", "#00FF00"),
    ("blue", "#0000FF"),
    ("yellow", "#FFFF00"),
    ("orange", "#FFA500"),
    ("gray", "#808080"),
];

impl OverlayStyle {
    /// Color as `#RRGGBB`. Short hex is expanded, a few names are mapped, and
    /// anything unrecognized falls back to white.
    pub fn hex_color(&self) -> String {
        let raw = self.color.trim();
        if let Some(hex) = raw.strip_prefix('#') {
            if hex.chars().all(|c| c.is_ascii_hexdigit()) {
                match hex.len() {
                    6 => return format!("#{}", hex.to_ascii_uppercase()),
                    3 => {
                        let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
                        return format!("#{}", expanded.to_ascii_uppercase());
                    }
                    _ => {}
                }
            }
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| raw.eq_ignore_ascii_case(name))
            .map(|(_, hex)| hex.to_string())
            .unwrap_or_else(default_color)
    }
}

/// Timed text drawn over the output video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    pub content: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub position: Option<OverlayPosition>,
    #[serde(default)]
    pub style: OverlayStyle,
}

/// Why an overlay was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OverlayError {
    #[error("overlay text is empty")]
    EmptyContent,

    #[error("overlay window is not finite")]
    NonFiniteWindow,

    #[error("overlay starts before zero ({0})")]
    NegativeStart(f64),

    #[error("overlay ends at {end} which is not after its start {start}")]
    InvertedWindow { start: f64, end: f64 },

    #[error("overlay ends at {end} past total duration {total}")]
    PastEnd { end: f64, total: f64 },

    #[error("overlay has no position")]
    MissingPosition,

    #[error("overlay position ({x}, {y}) is outside the frame")]
    PositionOutOfRange { x: f64, y: f64 },

    #[error("overlay size {0} is out of range")]
    InvalidSize(u32),
}

impl TextOverlay {
    pub fn new(content: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            content: content.into(),
            start_time,
            end_time,
            position: Some(OverlayPosition::center()),
            style: OverlayStyle::default(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(OverlayPosition { x, y });
        self
    }

    pub fn with_font(mut self, font_family: impl Into<String>) -> Self {
        self.style.font_family = font_family.into();
        self
    }

    /// Validate the window and position. `total` bounds the end time when known.
    pub fn validate(&self, total: Option<f64>) -> Result<(), OverlayError> {
        if self.content.trim().is_empty() {
            return Err(OverlayError::EmptyContent);
        }
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(OverlayError::NonFiniteWindow);
        }
        if self.start_time < 0.0 {
            return Err(OverlayError::NegativeStart(self.start_time));
        }
        if self.end_time <= self.start_time {
            return Err(OverlayError::InvertedWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if let Some(total) = total {
            if self.end_time > total + 1e-9 {
                return Err(OverlayError::PastEnd {
                    end: self.end_time,
                    total,
                });
            }
        }
        let position = self.position.ok_or(OverlayError::MissingPosition)?;
        if !position.is_valid() {
            return Err(OverlayError::PositionOutOfRange {
                x: position.x,
                y: position.y,
            });
        }
        if self.style.size == 0 || self.style.size > MAX_OVERLAY_SIZE {
            return Err(OverlayError::InvalidSize(self.style.size));
        }
        Ok(())
    }

    /// Anchor point; only meaningful after [`TextOverlay::validate`] passed.
    pub fn anchor(&self) -> OverlayPosition {
        self.position.unwrap_or_else(OverlayPosition::center)
    }
}

/// The full ordered timeline handed to the render compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionScript {
    pub clips: Vec<Clip>,
    pub overlays: Vec<TextOverlay>,
    pub total_duration: f64,
}

impl CompositionScript {
    /// Sum of clip durations.
    pub fn clip_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration).sum()
    }

    /// Latest overlay end time, zero without overlays.
    pub fn overlay_end(&self) -> f64 {
        latest_overlay_end(&self.overlays)
    }

    pub fn has_overlays(&self) -> bool {
        !self.overlays.is_empty()
    }
}

/// Latest end time across a set of overlays.
pub fn latest_overlay_end(overlays: &[TextOverlay]) -> f64 {
    overlays.iter().map(|o| o.end_time).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_overlay() {
        let overlay = TextOverlay::new("Sunset swim", 1.0, 3.0).at(50.0, 80.0);
        assert!(overlay.validate(Some(10.0)).is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let overlay = TextOverlay::new("Oops", 5.0, 3.0);
        assert_eq!(
            overlay.validate(None),
            Err(OverlayError::InvertedWindow { start: 5.0, end: 3.0 })
        );
    }

    #[test]
    fn test_missing_and_out_of_range_position() {
        let mut overlay = TextOverlay::new("Hi", 0.0, 1.0);
        overlay.position = None;
        assert_eq!(overlay.validate(None), Err(OverlayError::MissingPosition));

        let overlay = TextOverlay::new("Hi", 0.0, 1.0).at(120.0, 10.0);
        assert!(matches!(
            overlay.validate(None),
            Err(OverlayError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_past_total_duration() {
        let overlay = TextOverlay::new("Late", 8.0, 12.0);
        assert!(matches!(
            overlay.validate(Some(10.0)),
            Err(OverlayError::PastEnd { .. })
        ));
    }

    #[test]
    fn test_hex_color_normalization() {
        let mut style = OverlayStyle::default();
        style.color = "#fa0".into();
        assert_eq!(style.hex_color(), "#FFAA00");
        style.color = "Yellow".into();
        assert_eq!(style.hex_color(), "#FFFF00");
        style.color = "rgb(1,2,3)".into();
        assert_eq!(style.hex_color(), "#FFFFFF");
    }

    #[test]
    fn test_style_defaults_from_json() {
        let overlay: TextOverlay = serde_json::from_value(serde_json::json!({
            "content": "Book now",
            "start_time": 0.0,
            "end_time": 2.0,
            "position": {"x": 50.0, "y": 90.0}
        }))
        .unwrap();
        assert_eq!(overlay.style.color, "#FFFFFF");
        assert_eq!(overlay.style.size, 64);
        assert_eq!(overlay.style.weight, FontWeight::Bold);
    }
}
