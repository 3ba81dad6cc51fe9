//! Footage assets and their ingestion state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AssetId;

/// Ingestion status of a footage asset.
///
/// `uploaded → processing → ready | pending_retry | error`. The sweeper moves
/// `pending_retry` (and crashed `processing`) assets back through ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Uploaded,
    Processing,
    Ready,
    PendingRetry,
    Error,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Uploaded => "uploaded",
            AssetStatus::Processing => "processing",
            AssetStatus::Ready => "ready",
            AssetStatus::PendingRetry => "pending_retry",
            AssetStatus::Error => "error",
        }
    }

    /// Parse the stored string form. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(AssetStatus::Uploaded),
            "processing" => Some(AssetStatus::Processing),
            "ready" => Some(AssetStatus::Ready),
            "pending_retry" => Some(AssetStatus::PendingRetry),
            "error" => Some(AssetStatus::Error),
            _ => None,
        }
    }

    /// Whether the sweeper may pick this asset up again.
    pub fn is_transient(&self) -> bool {
        matches!(self, AssetStatus::Processing | AssetStatus::PendingRetry)
    }

    /// Whether the asset may be offered to the matching engine.
    pub fn is_matchable(&self) -> bool {
        matches!(self, AssetStatus::Ready)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of media stored for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Video,
    Image,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

/// Raw footage uploaded by a user for one property.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FootageAsset {
    pub id: AssetId,
    pub owner_id: String,
    pub property_id: String,
    /// Object key in storage
    pub storage_key: String,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub status: AssetStatus,
    /// Duration in seconds, when the container reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Generated content description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object key of the thumbnail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
    /// Intrinsic popularity used to break scoring ties
    #[serde(default)]
    pub popularity: f64,
    /// Number of times the sweeper re-queued this asset
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FootageAsset {
    /// Create a freshly uploaded asset.
    pub fn new(
        id: AssetId,
        owner_id: impl Into<String>,
        property_id: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.into(),
            property_id: property_id.into(),
            storage_key: storage_key.into(),
            media_kind: MediaKind::Video,
            status: AssetStatus::Uploaded,
            duration: None,
            description: None,
            thumbnail_key: None,
            popularity: 0.0,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style description setter, mostly for tests and fixtures.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: AssetStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Description text, empty when none was generated.
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Apply an ingestion outcome in place.
    pub fn apply_outcome(&mut self, outcome: &AssetOutcome) {
        self.status = outcome.status;
        self.duration = outcome.duration.or(self.duration);
        if outcome.description.is_some() {
            self.description = outcome.description.clone();
        }
        if outcome.thumbnail_key.is_some() {
            self.thumbnail_key = outcome.thumbnail_key.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Result of one ingestion attempt, written to the asset in a single update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetOutcome {
    pub status: AssetStatus,
    pub duration: Option<f64>,
    pub description: Option<String>,
    pub thumbnail_key: Option<String>,
    /// Vision attempts spent on this ingestion
    pub attempts: u32,
}

impl AssetOutcome {
    /// Derive the final status from what was produced.
    ///
    /// A non-empty description means `ready`, anything else `pending_retry`.
    pub fn from_results(
        duration: Option<f64>,
        description: Option<String>,
        thumbnail_key: Option<String>,
        attempts: u32,
    ) -> Self {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let status = if description.is_some() {
            AssetStatus::Ready
        } else {
            AssetStatus::PendingRetry
        };
        Self {
            status,
            duration,
            description,
            thumbnail_key,
            attempts,
        }
    }

    /// Outcome for a storage or decoding failure.
    pub fn failed(duration: Option<f64>) -> Self {
        Self {
            status: AssetStatus::Error,
            duration,
            description: None,
            thumbnail_key: None,
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AssetStatus::Uploaded,
            AssetStatus::Processing,
            AssetStatus::Ready,
            AssetStatus::PendingRetry,
            AssetStatus::Error,
        ] {
            assert_eq!(AssetStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AssetStatus::parse("bogus"), None);
    }

    #[test]
    fn test_outcome_status_follows_description() {
        let ready = AssetOutcome::from_results(Some(4.0), Some("pool at dusk".into()), None, 1);
        assert_eq!(ready.status, AssetStatus::Ready);

        let blank = AssetOutcome::from_results(Some(4.0), Some("   ".into()), Some("t.jpg".into()), 10);
        assert_eq!(blank.status, AssetStatus::PendingRetry);
        assert!(blank.description.is_none());
        assert_eq!(blank.thumbnail_key.as_deref(), Some("t.jpg"));
    }

    #[test]
    fn test_apply_outcome_keeps_known_duration() {
        let mut asset = FootageAsset::new(AssetId::from("a"), "u", "p", "k").with_duration(7.5);
        asset.apply_outcome(&AssetOutcome::from_results(None, Some("lobby".into()), None, 1));
        assert_eq!(asset.duration, Some(7.5));
        assert_eq!(asset.status, AssetStatus::Ready);
        assert_eq!(asset.description_text(), "lobby");
    }
}
