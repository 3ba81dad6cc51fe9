//! Slot → asset assignments produced by the matching engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{AssetId, SlotId};

/// Rationale used when an asset had to be reused or picked without a match.
pub const FALLBACK_RATIONALE: &str = "fallback";

/// Rationale used when the candidate pool was empty.
pub const NO_CANDIDATES_RATIONALE: &str = "no candidates";

/// Assignment of one asset to one template slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlotAssignment {
    pub slot_id: SlotId,
    /// `None` only when there were no candidates at all
    pub asset_id: Option<AssetId>,
    /// Normalized score in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    /// Set when the asset was reused or picked below the scoring floor
    #[serde(default)]
    pub fallback: bool,
    /// Playable URL supplied by the caller for hand-edited timelines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl SlotAssignment {
    pub fn matched(slot_id: SlotId, asset_id: AssetId, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            slot_id,
            asset_id: Some(asset_id),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            fallback: false,
            source_url: None,
        }
    }

    pub fn fallback(slot_id: SlotId, asset_id: AssetId, confidence: f64) -> Self {
        Self {
            slot_id,
            asset_id: Some(asset_id),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: FALLBACK_RATIONALE.to_string(),
            fallback: true,
            source_url: None,
        }
    }

    pub fn unfilled(slot_id: SlotId) -> Self {
        Self {
            slot_id,
            asset_id: None,
            confidence: 0.0,
            rationale: NO_CANDIDATES_RATIONALE.to_string(),
            fallback: true,
            source_url: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback || self.rationale == FALLBACK_RATIONALE
    }
}
