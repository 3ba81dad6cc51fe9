//! TTML caption documents for text overlays.
//!
//! Each overlay gets its own style and its own region. Regions are ten frames
//! wide and centered on the overlay anchor so the engine never wraps a line.

use vreel_models::{FontSlant, FontWeight, TextOverlay};

use crate::font::{dominant_category, FontCategory};
use crate::timecode::clock_time;

/// Output frame geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameSize {
    fn default() -> Self {
        // 9:16 portrait
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

/// Region width as a multiple of the frame width.
const REGION_WIDTH_FACTOR: i64 = 10;

/// Line box height as a multiple of the font size.
const LINE_HEIGHT_FACTOR: f64 = 1.5;

/// Placement box for one overlay, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub origin_x: i64,
    pub origin_y: i64,
    pub width: i64,
    pub height: i64,
}

impl Region {
    /// Region centered on the overlay anchor.
    pub fn for_overlay(overlay: &TextOverlay, frame: FrameSize) -> Self {
        let anchor = overlay.anchor();
        let width = i64::from(frame.width) * REGION_WIDTH_FACTOR;
        let height = (f64::from(overlay.style.size) * LINE_HEIGHT_FACTOR).ceil() as i64;
        let center_x = (anchor.x / 100.0 * f64::from(frame.width)).round() as i64;
        let center_y = (anchor.y / 100.0 * f64::from(frame.height)).round() as i64;
        Self {
            origin_x: center_x - width / 2,
            origin_y: center_y - height / 2,
            width,
            height,
        }
    }
}

/// A rendered caption document plus the engine-level fallback font.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionDocument {
    pub xml: String,
    pub dominant_font: FontCategory,
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn weight_attr(weight: FontWeight) -> &'static str {
    match weight {
        FontWeight::Normal => "normal",
        FontWeight::Bold => "bold",
    }
}

fn slant_attr(slant: FontSlant) -> &'static str {
    match slant {
        FontSlant::Normal => "normal",
        FontSlant::Italic => "italic",
    }
}

/// Build the caption document for already validated overlays.
pub fn build_caption_document(overlays: &[TextOverlay], frame: FrameSize) -> CaptionDocument {
    let categories: Vec<FontCategory> = overlays
        .iter()
        .map(|o| FontCategory::classify(&o.style.font_family))
        .collect();
    let dominant = dominant_category(&categories);

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<tt xmlns=\"http://www.w3.org/ns/ttml\" xmlns:tts=\"http://www.w3.org/ns/ttml#styling\" \
         xmlns:ttp=\"http://www.w3.org/ns/ttml#parameter\" ttp:timeBase=\"media\" \
         tts:extent=\"{}px {}px\" xml:lang=\"en\">\n",
        frame.width, frame.height
    ));
    xml.push_str("  <head>\n");

    xml.push_str("    <styling>\n");
    for (i, (overlay, category)) in overlays.iter().zip(&categories).enumerate() {
        xml.push_str(&format!(
            "      <style xml:id=\"s{}\" tts:fontFamily=\"{}\" tts:fontSize=\"{}px\" tts:color=\"{}\" \
             tts:fontWeight=\"{}\" tts:fontStyle=\"{}\" tts:textAlign=\"center\"/>\n",
            i,
            category,
            overlay.style.size,
            escape_xml(&overlay.style.hex_color()),
            weight_attr(overlay.style.weight),
            slant_attr(overlay.style.slant),
        ));
    }
    xml.push_str("    </styling>\n");

    xml.push_str("    <layout>\n");
    for (i, overlay) in overlays.iter().enumerate() {
        let region = Region::for_overlay(overlay, frame);
        xml.push_str(&format!(
            "      <region xml:id=\"r{}\" tts:origin=\"{}px {}px\" tts:extent=\"{}px {}px\" \
             tts:fontFamily=\"{}\" tts:displayAlign=\"center\" tts:textAlign=\"center\" \
             tts:wrapOption=\"noWrap\"/>\n",
            i, region.origin_x, region.origin_y, region.width, region.height, dominant,
        ));
    }
    xml.push_str("    </layout>\n");
    xml.push_str("  </head>\n");

    xml.push_str("  <body>\n");
    xml.push_str("    <div>\n");
    for (i, overlay) in overlays.iter().enumerate() {
        xml.push_str(&format!(
            "      <p begin=\"{}\" end=\"{}\" region=\"r{}\" style=\"s{}\">{}</p>\n",
            clock_time(overlay.start_time),
            clock_time(overlay.end_time),
            i,
            i,
            escape_xml(&overlay.content),
        ));
    }
    xml.push_str("    </div>\n");
    xml.push_str("  </body>\n");
    xml.push_str("</tt>\n");

    CaptionDocument {
        xml,
        dominant_font: dominant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_is_centered_and_wide() {
        let overlay = TextOverlay::new("Hi", 0.0, 1.0).at(50.0, 25.0);
        let region = Region::for_overlay(&overlay, FrameSize::default());
        assert_eq!(region.width, 10_800);
        assert_eq!(region.height, 96); // ceil(64 * 1.5)
        assert_eq!(region.origin_x + region.width / 2, 540);
        assert_eq!(region.origin_y + region.height / 2, 480);
    }

    #[test]
    fn test_region_height_rounds_up() {
        let mut overlay = TextOverlay::new("Hi", 0.0, 1.0);
        overlay.style.size = 33;
        let region = Region::for_overlay(&overlay, FrameSize::default());
        assert_eq!(region.height, 50); // 49.5 rounded up
    }

    #[test]
    fn test_document_escapes_and_times() {
        let overlays = vec![
            TextOverlay::new("Fish & <Chips>", 0.5, 2.25),
            TextOverlay::new("Rooftop bar", 3.0, 4.0).with_font("Playfair Display"),
        ];
        let doc = build_caption_document(&overlays, FrameSize::default());

        assert!(doc.xml.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(doc
            .xml
            .contains("<p begin=\"00:00:00.500\" end=\"00:00:02.250\" region=\"r0\" style=\"s0\">"));
        assert!(doc.xml.contains("xml:id=\"s1\" tts:fontFamily=\"serif\""));
        assert!(doc.xml.contains("tts:wrapOption=\"noWrap\""));
        // one of each: tie goes to the first category seen
        assert_eq!(doc.dominant_font, FontCategory::SansSerif);
        assert_eq!(doc.xml.matches("<region ").count(), 2);
        assert_eq!(doc.xml.matches("tts:fontFamily=\"sansSerif\" tts:displayAlign").count(), 2);
    }

    #[test]
    fn test_escape_xml_quotes() {
        assert_eq!(escape_xml("\"it's\""), "&quot;it&apos;s&quot;");
    }
}
