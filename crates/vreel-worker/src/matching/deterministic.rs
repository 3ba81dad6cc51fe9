//! Greedy deterministic matcher.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use vreel_models::{AssetId, FootageAsset, SlotAssignment, TemplateSlot, FALLBACK_RATIONALE};

use super::scoring::{confidence, rank_order, score, ScoreBreakdown, SCORE_FLOOR};
use super::MatchStrategy;
use crate::error::WorkerResult;

/// Confidence ceiling for reused assets.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Slot-by-slot greedy assignment over token, theme and duration scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicMatcher;

struct Scored<'a> {
    asset: &'a FootageAsset,
    breakdown: ScoreBreakdown,
}

fn best<'a, 'b>(scored: impl Iterator<Item = &'b Scored<'a>>) -> Option<&'b Scored<'a>>
where
    'a: 'b,
{
    scored.min_by(|a, b| rank_order(a.breakdown.total, a.asset, b.breakdown.total, b.asset))
}

impl DeterministicMatcher {
    /// Assign every slot. Synchronous core of the strategy.
    pub fn assign_all(&self, candidates: &[FootageAsset], slots: &[TemplateSlot]) -> Vec<SlotAssignment> {
        if candidates.is_empty() {
            return slots.iter().map(|s| SlotAssignment::unfilled(s.id.clone())).collect();
        }

        let mut used: HashSet<AssetId> = HashSet::new();
        let mut assignments: Vec<Option<SlotAssignment>> = Vec::with_capacity(slots.len());

        for (index, slot) in slots.iter().enumerate() {
            let scored: Vec<Scored<'_>> = candidates
                .iter()
                .map(|asset| Scored {
                    asset,
                    breakdown: score(slot, asset, index, slots.len()),
                })
                .collect();

            let unused = best(scored.iter().filter(|s| !used.contains(&s.asset.id)));
            let assignment = match unused {
                Some(pick) if pick.breakdown.total >= SCORE_FLOOR => SlotAssignment::matched(
                    slot.id.clone(),
                    pick.asset.id.clone(),
                    confidence(pick.breakdown.total, slot),
                    pick.breakdown.rationale(),
                ),
                Some(pick) => {
                    // nothing matches; take the best unused asset anyway
                    let mut a = SlotAssignment::matched(
                        slot.id.clone(),
                        pick.asset.id.clone(),
                        confidence(pick.breakdown.total, slot),
                        format!("{}: best available, {}", FALLBACK_RATIONALE, pick.breakdown.rationale()),
                    );
                    a.fallback = true;
                    a
                }
                None => match best(scored.iter()) {
                    Some(pick) => SlotAssignment::fallback(
                        slot.id.clone(),
                        pick.asset.id.clone(),
                        confidence(pick.breakdown.total, slot).min(FALLBACK_CONFIDENCE),
                    ),
                    None => SlotAssignment::unfilled(slot.id.clone()),
                },
            };

            if let Some(id) = &assignment.asset_id {
                used.insert(id.clone());
            }
            debug!(
                slot_id = %slot.id,
                asset_id = ?assignment.asset_id,
                confidence = assignment.confidence,
                fallback = assignment.fallback,
                "Slot assigned"
            );
            assignments.push(Some(assignment));
        }

        // Final sweep: anything still empty takes the first candidate in rank order.
        assignments
            .into_iter()
            .zip(slots)
            .map(|(assignment, slot)| match assignment {
                Some(a) if a.asset_id.is_some() => a,
                _ => {
                    let mut pool: Vec<&FootageAsset> = candidates.iter().collect();
                    pool.sort_by(|a, b| rank_order(0.0, a, 0.0, b));
                    match pool.first() {
                        Some(asset) => SlotAssignment::fallback(slot.id.clone(), asset.id.clone(), 0.0),
                        None => SlotAssignment::unfilled(slot.id.clone()),
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl MatchStrategy for DeterministicMatcher {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn assign(
        &self,
        candidates: &[FootageAsset],
        slots: &[TemplateSlot],
    ) -> WorkerResult<Vec<SlotAssignment>> {
        Ok(self.assign_all(candidates, slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::{AssetStatus, SlotId};

    fn slots(descriptions: &[&str]) -> Vec<TemplateSlot> {
        let mut offset = 0.0;
        descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let slot = TemplateSlot {
                    id: SlotId::from(format!("s{}", i)),
                    position: i as u32,
                    target_duration: 2.0,
                    description: d.to_string(),
                    start_offset: offset,
                    end_offset: offset + 2.0,
                };
                offset += 2.0;
                slot
            })
            .collect()
    }

    fn asset(id: &str, description: &str) -> FootageAsset {
        FootageAsset::new(AssetId::from(id), "u", "p", "k")
            .with_description(description)
            .with_status(AssetStatus::Ready)
    }

    #[test]
    fn test_short_pool_falls_back_on_last_slot() {
        let candidates = vec![asset("c1", "swimming pool view"), asset("c2", "bedroom suite")];
        let result = DeterministicMatcher.assign_all(&candidates, &slots(&["pool", "room", "dining"]));

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].asset_id, Some(AssetId::from("c1")));
        assert_eq!(result[1].asset_id, Some(AssetId::from("c2")));
        assert!(!result[0].fallback && !result[1].fallback);

        let last = &result[2];
        assert!(last.asset_id.is_some());
        assert!(last.is_fallback());
        assert_eq!(last.rationale, FALLBACK_RATIONALE);
        assert!(last.confidence <= FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_no_duplicates_when_pool_is_large_enough() {
        let candidates = vec![
            asset("a", "lobby with chandelier"),
            asset("b", "lobby reception desk"),
            asset("c", "gym"),
            asset("d", "spa sauna"),
        ];
        let result = DeterministicMatcher.assign_all(&candidates, &slots(&["lobby", "lobby", "lobby"]));
        let ids: HashSet<_> = result.iter().filter_map(|a| a.asset_id.clone()).collect();
        assert_eq!(ids.len(), 3);
        // third lobby slot had no lobby footage left
        assert!(result[2].fallback);
        assert!(!result[2].rationale.is_empty());
    }

    #[test]
    fn test_empty_pool_leaves_slots_unfilled() {
        let result = DeterministicMatcher.assign_all(&[], &slots(&["pool", "bar"]));
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|a| a.asset_id.is_none() && a.confidence == 0.0));
    }

    #[test]
    fn test_popularity_breaks_ties() {
        let mut popular = asset("z", "rooftop bar");
        popular.popularity = 10.0;
        let candidates = vec![asset("a", "rooftop bar"), popular];
        let result = DeterministicMatcher.assign_all(&candidates, &slots(&["bar"]));
        assert_eq!(result[0].asset_id, Some(AssetId::from("z")));
    }

    #[test]
    fn test_result_is_deterministic() {
        let candidates = vec![asset("b", "pool"), asset("a", "pool"), asset("c", "beach")];
        let s = slots(&["pool", "beach", "pool", "sunset"]);
        let first = DeterministicMatcher.assign_all(&candidates, &s);
        let second = DeterministicMatcher.assign_all(&candidates, &s);
        assert_eq!(first, second);
        assert_eq!(first[0].asset_id, Some(AssetId::from("a")));
    }
}
