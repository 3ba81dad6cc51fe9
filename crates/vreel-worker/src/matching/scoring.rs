//! Slot/candidate scoring.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use vreel_models::{FootageAsset, TemplateSlot};

use super::taxonomy::categories_of;

/// Per shared token.
pub const EXACT_WEIGHT: f64 = 3.0;
/// Per slot token that is a substring of a candidate token, or the reverse.
pub const PARTIAL_WEIGHT: f64 = 1.0;
/// Flat bonus for sharing at least one theme.
pub const CATEGORY_BONUS: f64 = 2.0;
/// Candidate long enough to cover the slot.
pub const DURATION_BONUS: f64 = 0.5;
/// Largest positional bonus (first slot, long candidate).
pub const POSITION_BONUS: f64 = 0.5;
/// Candidates at least this long get the full positional bonus.
const LONG_CLIP_SECS: f64 = 10.0;
/// Scores below this do not count as a content match.
pub const SCORE_FLOOR: f64 = 1.0;

const STOPWORDS: [&str; 24] = [
    "a", "an", "and", "at", "by", "for", "from", "in", "into", "is", "of", "on", "or", "over", "shot",
    "the", "to", "with", "clip", "video", "showing", "shows", "some", "this",
];

/// Lowercased content tokens, deduplicated and sorted.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// How a score was reached, for rationales.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub exact: Vec<String>,
    pub partial: Vec<String>,
    pub shared_categories: Vec<&'static str>,
    pub covers_duration: bool,
    pub position_bonus: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    pub fn rationale(&self) -> String {
        let mut reasons = Vec::new();
        if !self.exact.is_empty() {
            reasons.push(format!("shared terms: {}", self.exact.join(", ")));
        }
        if !self.partial.is_empty() {
            reasons.push(format!("related terms: {}", self.partial.join(", ")));
        }
        if !self.shared_categories.is_empty() {
            reasons.push(format!("theme: {}", self.shared_categories.join(", ")));
        }
        if self.covers_duration {
            reasons.push("long enough for the slot".to_string());
        }
        if reasons.is_empty() {
            "no content overlap".to_string()
        } else {
            reasons.join("; ")
        }
    }
}

/// Score one candidate for one slot.
///
/// `slot_index`/`slot_count` drive the positional bonus, which favors long
/// candidates for early slots.
pub fn score(slot: &TemplateSlot, candidate: &FootageAsset, slot_index: usize, slot_count: usize) -> ScoreBreakdown {
    let slot_tokens = tokenize(&slot.description);
    let candidate_text = candidate.description_text();
    let candidate_tokens = tokenize(candidate_text);

    let exact: Vec<String> = slot_tokens.intersection(&candidate_tokens).cloned().collect();
    let partial: Vec<String> = slot_tokens
        .iter()
        .filter(|t| !candidate_tokens.contains(*t) && t.len() >= 3)
        .filter(|t| {
            candidate_tokens
                .iter()
                .any(|c| c.len() >= 3 && (c.contains(t.as_str()) || t.contains(c.as_str())))
        })
        .cloned()
        .collect();

    let candidate_categories = categories_of(candidate_text);
    let shared_categories: Vec<&'static str> = categories_of(&slot.description)
        .into_iter()
        .filter(|c| candidate_categories.contains(c))
        .collect();

    let covers_duration = candidate
        .duration
        .is_some_and(|d| d + 1e-9 >= slot.target_duration);

    let earliness = if slot_count > 1 {
        1.0 - slot_index as f64 / (slot_count - 1) as f64
    } else {
        1.0
    };
    let length = candidate
        .duration
        .map(|d| (d / LONG_CLIP_SECS).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let position_bonus = POSITION_BONUS * earliness * length;

    let mut total = EXACT_WEIGHT * exact.len() as f64 + PARTIAL_WEIGHT * partial.len() as f64 + position_bonus;
    if !shared_categories.is_empty() {
        total += CATEGORY_BONUS;
    }
    if covers_duration {
        total += DURATION_BONUS;
    }

    ScoreBreakdown {
        exact,
        partial,
        shared_categories,
        covers_duration,
        position_bonus,
        total,
    }
}

/// Highest score this slot could reach, for normalization.
pub fn ceiling(slot: &TemplateSlot) -> f64 {
    let tokens = tokenize(&slot.description).len().max(1) as f64;
    EXACT_WEIGHT * tokens + CATEGORY_BONUS + DURATION_BONUS + POSITION_BONUS
}

/// Score normalized into [0, 1].
pub fn confidence(total: f64, slot: &TemplateSlot) -> f64 {
    (total / ceiling(slot)).clamp(0.0, 1.0)
}

/// Ranking order: higher score, then higher popularity, then lower id.
///
/// `Ordering::Less` means `a` ranks first.
pub fn rank_order(a_score: f64, a: &FootageAsset, b_score: f64, b: &FootageAsset) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| b.popularity.total_cmp(&a.popularity))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::{AssetId, SlotId};

    fn slot(description: &str, duration: f64) -> TemplateSlot {
        TemplateSlot {
            id: SlotId::from("s"),
            position: 0,
            target_duration: duration,
            description: description.into(),
            start_offset: 0.0,
            end_offset: duration,
        }
    }

    fn asset(id: &str, description: &str) -> FootageAsset {
        FootageAsset::new(AssetId::from(id), "u", "p", "k").with_description(description)
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        let tokens: Vec<String> = tokenize("A shot of the Pool, at sunset!").into_iter().collect();
        assert_eq!(tokens, vec!["pool", "sunset"]);
    }

    #[test]
    fn test_exact_beats_partial() {
        let s = slot("pool", 3.0);
        let exact = score(&s, &asset("a", "swimming pool view"), 0, 1);
        let partial = score(&s, &asset("b", "poolside bar"), 0, 1);
        assert_eq!(exact.exact, vec!["pool"]);
        assert_eq!(partial.partial, vec!["pool"]);
        assert!(exact.total > partial.total);
    }

    #[test]
    fn test_category_and_duration_bonuses() {
        let s = slot("room", 3.0);
        let b = score(&s, &asset("a", "bedroom suite").with_duration(4.0), 0, 1);
        assert_eq!(b.shared_categories, vec!["room"]);
        assert!(b.covers_duration);
        assert!(b.total >= PARTIAL_WEIGHT + CATEGORY_BONUS + DURATION_BONUS);
        assert!(confidence(b.total, &s) <= 1.0);
    }

    #[test]
    fn test_position_bonus_favors_early_slots() {
        let s = slot("lobby", 3.0);
        let a = asset("a", "lobby").with_duration(20.0);
        let early = score(&s, &a, 0, 3);
        let late = score(&s, &a, 2, 3);
        assert_eq!(early.position_bonus, POSITION_BONUS);
        assert_eq!(late.position_bonus, 0.0);
    }

    #[test]
    fn test_rank_order_tie_break() {
        let mut popular = asset("b", "x");
        popular.popularity = 5.0;
        let plain = asset("a", "x");
        assert_eq!(rank_order(1.0, &popular, 1.0, &plain), Ordering::Less);
        assert_eq!(rank_order(1.0, &plain, 1.0, &asset("c", "x")), Ordering::Less);
        assert_eq!(rank_order(0.5, &popular, 1.0, &plain), Ordering::Greater);
    }
}
