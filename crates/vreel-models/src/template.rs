//! Viral templates and their slot scripts.
//!
//! Template slot scripts are stored in more than one shape: sometimes as a
//! structured JSON array, sometimes as a string that wraps the same JSON in a
//! code fence or a `script:` label. [`parse_slot_script`] is the single
//! boundary where that ambiguity is resolved into canonical [`TemplateSlot`]s.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SlotId, TemplateId};

/// One ordered slot on a template timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateSlot {
    pub id: SlotId,
    /// Zero-based position on the template timeline
    pub position: u32,
    /// Target duration in seconds
    pub target_duration: f64,
    /// Free-text description of the content the slot needs
    pub description: String,
    /// Start within the template's own timeline (seconds)
    pub start_offset: f64,
    /// End within the template's own timeline (seconds)
    pub end_offset: f64,
}

/// A published template.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    /// Performance score used for ranking ties
    #[serde(default)]
    pub popularity: f64,
    pub slots: Vec<TemplateSlot>,
}

impl Template {
    /// Total length of the template timeline.
    pub fn duration(&self) -> f64 {
        self.slots.iter().map(|s| s.target_duration).sum()
    }
}

/// Errors from slot-script parsing.
#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("slot script is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("slot {index} has invalid duration {duration}")]
    InvalidDuration { index: usize, duration: f64 },

    #[error("slot script is empty")]
    Empty,
}

/// One slot as it appears in a stored script, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawSlot {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(alias = "target_duration", alias = "targetDuration")]
    pub duration: f64,
    #[serde(default, alias = "content", alias = "desc")]
    pub description: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Slot scripts as they arrive from storage or callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SlotScriptPayload {
    Structured(Vec<RawSlot>),
    Wrapped { slots: Vec<RawSlot> },
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextBody {
    List(Vec<RawSlot>),
    Wrapped { slots: Vec<RawSlot> },
}

const LABEL_PREFIXES: [&str; 3] = ["script:", "json:", "slots:"];

fn strip_text_wrapping(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.trim_end();
        body = body.strip_suffix("```").unwrap_or(body);
        body = body.trim();
    }

    for label in LABEL_PREFIXES {
        let matches = body
            .get(..label.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(label));
        if matches {
            body = body[label.len()..].trim_start();
            break;
        }
    }

    body
}

/// Parse a slot script payload into canonical slots.
///
/// Slots are ordered by explicit position (slots without one keep their input
/// order after the positioned ones) and offsets are derived cumulatively.
pub fn parse_slot_script(payload: SlotScriptPayload) -> Result<Vec<TemplateSlot>, TemplateError> {
    let raw = match payload {
        SlotScriptPayload::Structured(slots) => slots,
        SlotScriptPayload::Wrapped { slots } => slots,
        SlotScriptPayload::Text(text) => {
            let body = strip_text_wrapping(&text);
            match serde_json::from_str::<TextBody>(body) {
                Ok(TextBody::List(slots)) => slots,
                Ok(TextBody::Wrapped { slots }) => slots,
                Err(e) => return Err(TemplateError::InvalidJson(e.to_string())),
            }
        }
    };

    if raw.is_empty() {
        return Err(TemplateError::Empty);
    }

    for (index, slot) in raw.iter().enumerate() {
        if !slot.duration.is_finite() || slot.duration <= 0.0 {
            return Err(TemplateError::InvalidDuration {
                index,
                duration: slot.duration,
            });
        }
    }

    let mut indexed: Vec<(usize, RawSlot)> = raw.into_iter().enumerate().collect();
    indexed.sort_by_key(|(i, s)| (s.position.is_none(), s.position.unwrap_or(0), *i));

    let mut offset = 0.0;
    let slots = indexed
        .into_iter()
        .enumerate()
        .map(|(position, (_, raw))| {
            let start = offset;
            offset += raw.duration;
            TemplateSlot {
                id: raw
                    .id
                    .map(SlotId::from)
                    .unwrap_or_else(|| SlotId::from(format!("slot-{}", position))),
                position: position as u32,
                target_duration: raw.duration,
                description: raw.description.trim().to_string(),
                start_offset: start,
                end_offset: offset,
            }
        })
        .collect();

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_payload_derives_offsets() {
        let payload: SlotScriptPayload = serde_json::from_value(serde_json::json!([
            {"duration": 2.5, "description": "pool"},
            {"duration": 3.0, "content": "room"}
        ]))
        .unwrap();

        let slots = parse_slot_script(payload).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start_offset, 0.0);
        assert_eq!(slots[0].end_offset, 2.5);
        assert_eq!(slots[1].start_offset, 2.5);
        assert_eq!(slots[1].end_offset, 5.5);
        assert_eq!(slots[1].description, "room");
    }

    #[test]
    fn test_fenced_string_payload() {
        let text = "```json\n[{\"duration\": 1.5, \"desc\": \"view\"}]\n```";
        let slots = parse_slot_script(SlotScriptPayload::Text(text.into())).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].description, "view");
        assert_eq!(slots[0].id.as_str(), "slot-0");
    }

    #[test]
    fn test_labelled_wrapped_string_payload() {
        let text = "Script: {\"slots\": [{\"target_duration\": 2, \"description\": \"spa\"}]}";
        let slots = parse_slot_script(SlotScriptPayload::Text(text.into())).unwrap();
        assert_eq!(slots[0].target_duration, 2.0);
    }

    #[test]
    fn test_explicit_positions_reorder() {
        let payload = SlotScriptPayload::Structured(vec![
            RawSlot { position: Some(1), duration: 2.0, description: "second".into(), id: None },
            RawSlot { position: Some(0), duration: 1.0, description: "first".into(), id: None },
        ]);
        let slots = parse_slot_script(payload).unwrap();
        assert_eq!(slots[0].description, "first");
        assert_eq!(slots[1].start_offset, 1.0);
    }

    #[test]
    fn test_rejects_bad_duration_and_empty() {
        let payload = SlotScriptPayload::Structured(vec![RawSlot {
            position: None,
            duration: 0.0,
            description: "x".into(),
            id: None,
        }]);
        assert!(matches!(
            parse_slot_script(payload),
            Err(TemplateError::InvalidDuration { index: 0, .. })
        ));
        assert_eq!(
            parse_slot_script(SlotScriptPayload::Structured(vec![])),
            Err(TemplateError::Empty)
        );
        assert!(matches!(
            parse_slot_script(SlotScriptPayload::Text("not json".into())),
            Err(TemplateError::InvalidJson(_))
        ));
    }
}
