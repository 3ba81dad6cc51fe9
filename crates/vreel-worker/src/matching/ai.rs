//! Language-model match strategy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vreel_models::{AssetId, FootageAsset, SlotAssignment, SlotId, TemplateSlot};

use super::{MatchStrategy, FALLBACK_CONFIDENCE};
use crate::error::{WorkerError, WorkerResult};
use crate::gemini::{strip_code_fence, GeminiClient, Part};

const STRATEGY: &str = "ai";

const INSTRUCTIONS: &str = "You assign stock footage clips to the slots of a short promotional \
video template. Each slot describes the shot it wants. Each candidate has a description and a \
duration in seconds. Assign exactly one candidate to every slot, in slot order. Do not use a \
candidate twice unless there are fewer candidates than slots. Only use candidate ids from the \
list. Answer with JSON of the form \
{\"assignments\":[{\"slot_id\":\"...\",\"asset_id\":\"...\",\"confidence\":0.0,\"rationale\":\"...\"}]} \
where confidence is between 0 and 1.";

#[derive(Serialize)]
struct PromptSlot<'a> {
    slot_id: &'a str,
    description: &'a str,
    duration: f64,
}

#[derive(Serialize)]
struct PromptCandidate<'a> {
    asset_id: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
}

#[derive(Serialize)]
struct Prompt<'a> {
    slots: Vec<PromptSlot<'a>>,
    candidates: Vec<PromptCandidate<'a>>,
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    assignments: Vec<ModelAssignment>,
}

#[derive(Debug, Deserialize)]
struct ModelAssignment {
    slot_id: String,
    asset_id: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

/// Delegates scoring to Gemini and maps its answer onto slot order.
///
/// The answer is only reshaped here; [`super::validate_assignments`] decides
/// whether it is usable.
pub struct AiMatcher {
    client: Arc<GeminiClient>,
}

impl AiMatcher {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    fn prompt(candidates: &[FootageAsset], slots: &[TemplateSlot]) -> WorkerResult<String> {
        let prompt = Prompt {
            slots: slots
                .iter()
                .map(|s| PromptSlot {
                    slot_id: s.id.as_str(),
                    description: &s.description,
                    duration: s.target_duration,
                })
                .collect(),
            candidates: candidates
                .iter()
                .map(|c| PromptCandidate {
                    asset_id: c.id.as_str(),
                    description: c.description_text(),
                    duration: c.duration,
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&prompt)
            .map_err(|e| WorkerError::strategy_failed(STRATEGY, format!("Failed to build prompt: {}", e)))?;
        Ok(format!("{}\n\n{}", INSTRUCTIONS, body))
    }
}

/// Reorder a model answer into slot order.
///
/// Repeats of an asset already used by an earlier slot are flagged as
/// fallbacks with low confidence.
fn to_assignments(answer: ModelAnswer, slots: &[TemplateSlot]) -> WorkerResult<Vec<SlotAssignment>> {
    let mut by_slot: HashMap<String, ModelAssignment> = HashMap::new();
    for a in answer.assignments {
        // first answer for a slot wins
        by_slot.entry(a.slot_id.clone()).or_insert(a);
    }

    let mut used: HashSet<String> = HashSet::new();
    slots
        .iter()
        .map(|slot| {
            let a = by_slot.remove(slot.id.as_str()).ok_or_else(|| {
                WorkerError::strategy_failed(STRATEGY, format!("no assignment for slot {}", slot.id))
            })?;
            if !used.insert(a.asset_id.clone()) {
                return Ok(SlotAssignment::fallback(
                    SlotId::from(a.slot_id),
                    AssetId::from(a.asset_id),
                    a.confidence.min(FALLBACK_CONFIDENCE),
                ));
            }
            let rationale = if a.rationale.trim().is_empty() {
                "model choice".to_string()
            } else {
                a.rationale
            };
            Ok(SlotAssignment::matched(
                SlotId::from(a.slot_id),
                AssetId::from(a.asset_id),
                a.confidence,
                rationale,
            ))
        })
        .collect()
}

#[async_trait]
impl MatchStrategy for AiMatcher {
    fn name(&self) -> &'static str {
        STRATEGY
    }

    async fn assign(
        &self,
        candidates: &[FootageAsset],
        slots: &[TemplateSlot],
    ) -> WorkerResult<Vec<SlotAssignment>> {
        let prompt = Self::prompt(candidates, slots)?;
        let text = self
            .client
            .generate(&[Part::text(prompt)], true)
            .await
            .map_err(|e| WorkerError::strategy_failed(STRATEGY, e.to_string()))?;

        let answer: ModelAnswer = serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            WorkerError::strategy_failed(STRATEGY, format!("Unparseable model answer: {}", e))
        })?;
        debug!(model = self.client.model(), returned = answer.assignments.len(), "Model assignments");

        to_assignments(answer, slots)
    }
}
