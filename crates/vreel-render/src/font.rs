//! Font name to generic family mapping.

use std::fmt;

/// Generic font categories the render engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontCategory {
    Monospace,
    SansSerif,
    Serif,
}

const MONOSPACE_HINTS: [&str; 6] = ["mono", "code", "courier", "consol", "menlo", "typewriter"];
const SERIF_HINTS: [&str; 8] = [
    "serif",
    "times",
    "georgia",
    "garamond",
    "playfair",
    "merriweather",
    "baskerville",
    "didot",
];

impl FontCategory {
    /// Classify a font family name by substring.
    pub fn classify(font_family: &str) -> Self {
        let name = font_family.to_lowercase();
        if MONOSPACE_HINTS.iter().any(|h| name.contains(h)) {
            return FontCategory::Monospace;
        }
        if name.contains("sans") {
            return FontCategory::SansSerif;
        }
        if SERIF_HINTS.iter().any(|h| name.contains(h)) {
            return FontCategory::Serif;
        }
        FontCategory::SansSerif
    }

    /// TTML generic family name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FontCategory::Monospace => "monospace",
            FontCategory::SansSerif => "sansSerif",
            FontCategory::Serif => "serif",
        }
    }
}

impl fmt::Display for FontCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most frequent category; ties go to the one that appeared first.
///
/// Falls back to sans-serif for an empty input.
pub fn dominant_category(categories: &[FontCategory]) -> FontCategory {
    let mut counts: Vec<(FontCategory, usize)> = Vec::new();
    for category in categories {
        match counts.iter_mut().find(|(c, _)| c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((*category, 1)),
        }
    }

    let mut best: Option<(FontCategory, usize)> = None;
    for (category, n) in counts {
        // strictly greater keeps the earliest on ties
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((category, n));
        }
    }
    best.map(|(c, _)| c).unwrap_or(FontCategory::SansSerif)
}
