//! Composition script builder.
//!
//! Turns slot assignments into an ordered, renderable timeline. Bad data in
//! a single clip or overlay is logged and dropped; the build itself never
//! fails.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use vreel_models::{
    latest_overlay_end, AssetId, Clip, CompositionScript, FootageAsset, SlotAssignment, SlotId,
    TemplateSlot, TextOverlay,
};
use vreel_storage::ObjectStorage;

/// Builds [`CompositionScript`]s, resolving asset ids to playable URLs.
pub struct ScriptBuilder {
    storage: Arc<dyn ObjectStorage>,
}

impl ScriptBuilder {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Build a script from assignments in slot order.
    ///
    /// `assets` is used to find each asset's storage key. `manual_total`
    /// comes from hand-edited timelines and overrides the computed total.
    pub async fn build(
        &self,
        assignments: &[SlotAssignment],
        slots: &[TemplateSlot],
        overlays: &[TextOverlay],
        assets: &[FootageAsset],
        manual_total: Option<f64>,
    ) -> CompositionScript {
        let by_slot: HashMap<&SlotId, &SlotAssignment> =
            assignments.iter().map(|a| (&a.slot_id, a)).collect();
        let keys: HashMap<&AssetId, &str> = assets
            .iter()
            .map(|a| (&a.id, a.storage_key.as_str()))
            .collect();

        let mut clips = Vec::with_capacity(slots.len());
        for slot in slots {
            let Some(assignment) = by_slot.get(&slot.id) else {
                warn!(slot_id = %slot.id, "Slot has no assignment, skipping");
                continue;
            };
            let Some(asset_id) = &assignment.asset_id else {
                warn!(slot_id = %slot.id, "Slot left unfilled, no clip");
                continue;
            };
            let Some(source_url) = self.resolve_url(asset_id, assignment, &keys).await else {
                warn!(
                    slot_id = %slot.id,
                    asset_id = %asset_id,
                    "No playable URL for assignment, dropping clip"
                );
                continue;
            };

            clips.push(Clip {
                source_asset: asset_id.clone(),
                source_url,
                trim_start: slot.start_offset,
                trim_end: slot.end_offset,
                duration: slot.target_duration,
                order: clips.len() as u32,
            });
        }

        let overlays: Vec<TextOverlay> = overlays
            .iter()
            .filter(|o| match o.validate(manual_total) {
                Ok(()) => true,
                Err(e) => {
                    warn!(content = %o.content, error = %e, "Dropping malformed overlay");
                    false
                }
            })
            .cloned()
            .collect();

        let clip_total: f64 = clips.iter().map(|c| c.duration).sum();
        let total_duration = manual_total.unwrap_or_else(|| clip_total.max(latest_overlay_end(&overlays)));

        debug!(
            clips = clips.len(),
            overlays = overlays.len(),
            total_duration,
            "Composition script built"
        );

        CompositionScript {
            clips,
            overlays,
            total_duration,
        }
    }

    async fn resolve_url(
        &self,
        asset_id: &AssetId,
        assignment: &SlotAssignment,
        keys: &HashMap<&AssetId, &str>,
    ) -> Option<String> {
        let literal = assignment.source_url.clone().filter(|u| !u.trim().is_empty());

        let Some(key) = keys.get(asset_id) else {
            return literal;
        };
        match self.storage.playable_url(key).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "URL resolution failed, using caller URL");
                literal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStorage;
    use vreel_models::AssetStatus;

    fn slot(id: &str, start: f64, end: f64) -> TemplateSlot {
        TemplateSlot {
            id: SlotId::from(id),
            position: 0,
            target_duration: end - start,
            description: "pool".into(),
            start_offset: start,
            end_offset: end,
        }
    }

    fn asset(id: &str, key: &str) -> FootageAsset {
        FootageAsset::new(AssetId::from(id), "u", "p", key).with_status(AssetStatus::Ready)
    }

    fn assign(slot: &str, asset: &str) -> SlotAssignment {
        SlotAssignment::matched(SlotId::from(slot), AssetId::from(asset), 0.9, "r")
    }

    #[tokio::test]
    async fn test_clips_follow_slots() {
        let builder = ScriptBuilder::new(Arc::new(FakeStorage::default()));
        let slots = vec![slot("s0", 0.0, 2.0), slot("s1", 2.0, 5.0)];
        let assets = vec![asset("a", "footage/a.mp4"), asset("b", "footage/b.mp4")];

        let script = builder
            .build(&[assign("s1", "b"), assign("s0", "a")], &slots, &[], &assets, None)
            .await;

        assert_eq!(script.clips.len(), 2);
        assert_eq!(script.clips[0].source_asset, AssetId::from("a"));
        assert_eq!(script.clips[0].source_url, "https://cdn.test/footage/a.mp4");
        assert_eq!(script.clips[1].trim_start, 2.0);
        assert_eq!(script.clips[1].trim_end, 5.0);
        assert_eq!(script.clips[1].order, 1);
        assert_eq!(script.total_duration, 5.0);
    }

    #[tokio::test]
    async fn test_failed_resolution_uses_caller_url() {
        let storage = FakeStorage::default();
        storage.fail_urls();
        let builder = ScriptBuilder::new(Arc::new(storage));
        let slots = vec![slot("s0", 0.0, 2.0), slot("s1", 2.0, 4.0)];
        let assets = vec![asset("a", "footage/a.mp4"), asset("b", "footage/b.mp4")];

        let mut with_url = assign("s0", "a");
        with_url.source_url = Some("https://elsewhere/a.mp4".into());

        let script = builder
            .build(&[with_url, assign("s1", "b")], &slots, &[], &assets, None)
            .await;

        // s1 had neither a resolvable key nor a literal
        assert_eq!(script.clips.len(), 1);
        assert_eq!(script.clips[0].source_url, "https://elsewhere/a.mp4");
        assert_eq!(script.total_duration, 2.0);
    }

    #[tokio::test]
    async fn test_overlays_validated_and_extend_total() {
        let builder = ScriptBuilder::new(Arc::new(FakeStorage::default()));
        let slots = vec![slot("s0", 0.0, 2.0)];
        let assets = vec![asset("a", "k")];
        let overlays = vec![
            TextOverlay::new("Welcome", 0.5, 6.0),
            TextOverlay::new("Backwards", 3.0, 1.0),
            TextOverlay::new("Off frame", 0.0, 1.0).at(150.0, 50.0),
        ];

        let script = builder
            .build(&[assign("s0", "a")], &slots, &overlays, &assets, None)
            .await;

        assert_eq!(script.overlays.len(), 1);
        assert_eq!(script.overlays[0].content, "Welcome");
        assert_eq!(script.total_duration, 6.0);
    }

    #[tokio::test]
    async fn test_manual_total_wins_and_bounds_overlays() {
        let builder = ScriptBuilder::new(Arc::new(FakeStorage::default()));
        let slots = vec![slot("s0", 0.0, 2.0)];
        let assets = vec![asset("a", "k")];
        let overlays = vec![TextOverlay::new("In", 0.0, 3.0), TextOverlay::new("Out", 3.0, 9.0)];

        let script = builder
            .build(&[assign("s0", "a")], &slots, &overlays, &assets, Some(4.0))
            .await;

        assert_eq!(script.total_duration, 4.0);
        assert_eq!(script.overlays.len(), 1);
        assert_eq!(script.overlays[0].content, "In");
    }

    #[tokio::test]
    async fn test_unfilled_slot_yields_no_clip() {
        let builder = ScriptBuilder::new(Arc::new(FakeStorage::default()));
        let slots = vec![slot("s0", 0.0, 2.0)];
        let script = builder
            .build(&[SlotAssignment::unfilled(SlotId::from("s0"))], &slots, &[], &[], None)
            .await;
        assert!(script.clips.is_empty());
        assert_eq!(script.total_duration, 0.0);
    }
}
