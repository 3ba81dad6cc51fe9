//! Footage-to-slot matching.
//!
//! A [`MatchEngine`] holds an ordered chain of [`MatchStrategy`]
//! implementations and returns the first result that passes validation.
//! The deterministic strategy is always last, so the chain cannot run dry.

mod ai;
mod deterministic;
mod rank;
mod scoring;
mod taxonomy;

pub use ai::AiMatcher;
pub use deterministic::{DeterministicMatcher, FALLBACK_CONFIDENCE};
pub use rank::{rank_templates, RankedTemplate};
pub use scoring::{confidence, rank_order, score, tokenize, ScoreBreakdown, SCORE_FLOOR};
pub use taxonomy::{categories_of, CATEGORIES};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use vreel_models::{AssetId, FootageAsset, SlotAssignment, TemplateSlot};

use crate::config::MatchingMode;
use crate::error::{WorkerError, WorkerResult};
use crate::gemini::GeminiClient;

/// One way of assigning candidates to slots.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce one assignment per slot, in slot order.
    async fn assign(
        &self,
        candidates: &[FootageAsset],
        slots: &[TemplateSlot],
    ) -> WorkerResult<Vec<SlotAssignment>>;
}

/// Ordered strategy chain.
#[derive(Clone)]
pub struct MatchEngine {
    strategies: Vec<Arc<dyn MatchStrategy>>,
}

impl MatchEngine {
    pub fn new(strategies: Vec<Arc<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Deterministic scoring only.
    pub fn deterministic() -> Self {
        Self::new(vec![Arc::new(DeterministicMatcher)])
    }

    /// Chain for the configured mode. AI mode without a client degrades to
    /// deterministic-only.
    pub fn for_mode(mode: MatchingMode, gemini: Option<Arc<GeminiClient>>) -> Self {
        match (mode, gemini) {
            (MatchingMode::Ai, Some(client)) => Self::new(vec![
                Arc::new(AiMatcher::new(client)),
                Arc::new(DeterministicMatcher),
            ]),
            (MatchingMode::Ai, None) => {
                warn!("AI matching requested without a Gemini client; using deterministic scoring");
                Self::deterministic()
            }
            (MatchingMode::Deterministic, _) => Self::deterministic(),
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Assign ready candidates to slots.
    pub async fn run(
        &self,
        candidates: &[FootageAsset],
        slots: &[TemplateSlot],
    ) -> WorkerResult<Vec<SlotAssignment>> {
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let ready: Vec<FootageAsset> = candidates
            .iter()
            .filter(|a| a.status.is_matchable())
            .cloned()
            .collect();
        if ready.is_empty() {
            info!(slots = slots.len(), "No ready footage; every slot left unfilled");
            return Ok(slots.iter().map(|s| SlotAssignment::unfilled(s.id.clone())).collect());
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            let outcome = strategy
                .assign(&ready, slots)
                .await
                .and_then(|assignments| {
                    validate_assignments(&assignments, &ready, slots)
                        .map(|_| assignments)
                        .map_err(|msg| WorkerError::strategy_failed(strategy.name(), msg))
                });

            match outcome {
                Ok(assignments) => {
                    metrics::counter!("vreel_match_strategy_total", "strategy" => strategy.name())
                        .increment(1);
                    info!(
                        strategy = strategy.name(),
                        slots = slots.len(),
                        candidates = ready.len(),
                        fallbacks = assignments.iter().filter(|a| a.is_fallback()).count(),
                        "Slots matched"
                    );
                    return Ok(assignments);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Match strategy failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::strategy_failed("none", "no match strategies configured")))
    }
}

/// Check a strategy's output against the matching contract.
///
/// One assignment per slot in slot order, every slot filled with a known
/// ready id, and no id used twice unless the pool is smaller than the slot
/// list. When it is, every candidate must be used before any is repeated.
pub fn validate_assignments(
    assignments: &[SlotAssignment],
    candidates: &[FootageAsset],
    slots: &[TemplateSlot],
) -> Result<(), String> {
    if assignments.len() != slots.len() {
        return Err(format!(
            "expected {} assignments, got {}",
            slots.len(),
            assignments.len()
        ));
    }

    let known: HashSet<&AssetId> = candidates.iter().map(|c| &c.id).collect();
    let mut seen: HashSet<&AssetId> = HashSet::new();
    let forced_reuse = candidates.len() < slots.len();

    for (assignment, slot) in assignments.iter().zip(slots) {
        if assignment.slot_id != slot.id {
            return Err(format!(
                "assignment for slot {} out of order (expected {})",
                assignment.slot_id, slot.id
            ));
        }
        let Some(asset_id) = &assignment.asset_id else {
            return Err(format!("slot {} left unfilled", slot.id));
        };
        if !known.contains(asset_id) {
            return Err(format!("slot {} assigned unknown asset {}", slot.id, asset_id));
        }
        if !seen.insert(asset_id) && !forced_reuse {
            return Err(format!("asset {} assigned twice", asset_id));
        }
        if !(0.0..=1.0).contains(&assignment.confidence) {
            return Err(format!(
                "slot {} confidence {} outside [0, 1]",
                slot.id, assignment.confidence
            ));
        }
    }

    let required = candidates.len().min(slots.len());
    if seen.len() < required {
        return Err(format!(
            "{} distinct assets used, {} candidates available",
            seen.len(),
            required
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::{AssetStatus, SlotId, NO_CANDIDATES_RATIONALE};

    fn slots(descriptions: &[&str]) -> Vec<TemplateSlot> {
        descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| TemplateSlot {
                id: SlotId::from(format!("s{}", i)),
                position: i as u32,
                target_duration: 2.0,
                description: d.to_string(),
                start_offset: 0.0,
                end_offset: 2.0,
            })
            .collect()
    }

    fn ready(id: &str, description: &str) -> FootageAsset {
        FootageAsset::new(AssetId::from(id), "u", "p", "k")
            .with_description(description)
            .with_status(AssetStatus::Ready)
    }

    struct Broken;

    #[async_trait]
    impl MatchStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn assign(
            &self,
            _candidates: &[FootageAsset],
            slots: &[TemplateSlot],
        ) -> WorkerResult<Vec<SlotAssignment>> {
            // right length, but invents an asset
            Ok(slots
                .iter()
                .map(|s| SlotAssignment::matched(s.id.clone(), AssetId::from("ghost"), 0.9, "made up"))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_every_slot_assigned() {
        let engine = MatchEngine::deterministic();
        let candidates = vec![ready("c1", "swimming pool view"), ready("c2", "bedroom suite")];
        let s = slots(&["pool", "room", "dining"]);

        let result = engine.run(&candidates, &s).await.unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|a| a.asset_id.is_some()));
        assert!(result[2].is_fallback());
        assert!(result[2].confidence < 0.5);
        for (a, slot) in result.iter().zip(&s) {
            assert_eq!(a.slot_id, slot.id);
        }
    }

    #[tokio::test]
    async fn test_only_ready_candidates_considered() {
        let engine = MatchEngine::deterministic();
        let pending = FootageAsset::new(AssetId::from("p1"), "u", "p", "k")
            .with_description("pool")
            .with_status(AssetStatus::PendingRetry);
        let candidates = vec![pending, ready("r1", "beach")];

        let result = engine.run(&candidates, &slots(&["pool"])).await.unwrap();
        assert_eq!(result[0].asset_id, Some(AssetId::from("r1")));
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let engine = MatchEngine::deterministic();
        assert!(engine.run(&[ready("a", "pool")], &[]).await.unwrap().is_empty());

        let result = engine.run(&[], &slots(&["pool", "bar"])).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result
            .iter()
            .all(|a| a.asset_id.is_none() && a.confidence == 0.0 && a.rationale == NO_CANDIDATES_RATIONALE));
    }

    #[tokio::test]
    async fn test_invalid_strategy_output_falls_through() {
        let engine = MatchEngine::new(vec![Arc::new(Broken), Arc::new(DeterministicMatcher)]);
        let candidates = vec![ready("c1", "pool")];

        let result = engine.run(&candidates, &slots(&["pool"])).await.unwrap();
        assert_eq!(result[0].asset_id, Some(AssetId::from("c1")));
    }

    #[tokio::test]
    async fn test_all_strategies_failing_is_an_error() {
        let engine = MatchEngine::new(vec![Arc::new(Broken)]);
        let err = engine
            .run(&[ready("c1", "pool")], &slots(&["pool"]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::StrategyFailed { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicates_unless_forced() {
        let s = slots(&["a", "b"]);
        let dup = vec![
            SlotAssignment::matched(SlotId::from("s0"), AssetId::from("x"), 0.5, "r"),
            SlotAssignment::matched(SlotId::from("s1"), AssetId::from("x"), 0.5, "r"),
        ];
        let two = vec![ready("x", "a"), ready("y", "b")];
        assert!(validate_assignments(&dup, &two, &s).is_err());

        let one = vec![ready("x", "a")];
        assert!(validate_assignments(&dup, &one, &s).is_ok());
    }

    #[test]
    fn test_validate_requires_pool_exhausted_before_reuse() {
        let s = slots(&["a", "b", "c"]);
        let pool = vec![ready("c1", "a"), ready("c2", "b")];
        let all_c1: Vec<SlotAssignment> = s
            .iter()
            .map(|slot| SlotAssignment::matched(slot.id.clone(), AssetId::from("c1"), 0.9, "r"))
            .collect();
        let err = validate_assignments(&all_c1, &pool, &s).unwrap_err();
        assert!(err.contains("distinct"));

        let spread = vec![
            SlotAssignment::matched(SlotId::from("s0"), AssetId::from("c1"), 0.9, "r"),
            SlotAssignment::matched(SlotId::from("s1"), AssetId::from("c2"), 0.9, "r"),
            SlotAssignment::fallback(SlotId::from("s2"), AssetId::from("c1"), FALLBACK_CONFIDENCE),
        ];
        assert!(validate_assignments(&spread, &pool, &s).is_ok());
    }

    #[test]
    fn test_for_mode_chain() {
        assert_eq!(
            MatchEngine::for_mode(MatchingMode::Ai, None).strategy_names(),
            vec!["deterministic"]
        );
        assert_eq!(
            MatchEngine::for_mode(MatchingMode::Deterministic, None).strategy_names(),
            vec!["deterministic"]
        );
    }
}
