//! Template ranking against a footage pool.

use serde::Serialize;

use vreel_models::{FootageAsset, Template, TemplateId};

use super::scoring::score;

/// A template and how well the pool covers it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTemplate {
    pub template_id: TemplateId,
    pub score: f64,
}

/// Score every template by the sum of its best per-slot scores.
///
/// Ordered by score, then template popularity, then id. Only matchable
/// candidates count.
pub fn rank_templates(templates: &[Template], candidates: &[FootageAsset]) -> Vec<RankedTemplate> {
    let pool: Vec<&FootageAsset> = candidates.iter().filter(|c| c.status.is_matchable()).collect();

    let mut scored: Vec<(&Template, f64)> = templates
        .iter()
        .map(|template| {
            let count = template.slots.len();
            let total = template
                .slots
                .iter()
                .enumerate()
                .map(|(i, slot)| {
                    pool.iter()
                        .map(|c| score(slot, c, i, count).total)
                        .fold(0.0, f64::max)
                })
                .sum::<f64>();
            (template, total)
        })
        .collect();

    scored.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| b.popularity.total_cmp(&a.popularity))
            .then_with(|| a.id.cmp(&b.id))
    });

    scored
        .into_iter()
        .map(|(t, score)| RankedTemplate {
            template_id: t.id.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::{AssetId, AssetStatus, SlotId, TemplateSlot};

    fn template(id: &str, popularity: f64, slots: &[&str]) -> Template {
        Template {
            id: TemplateId::from(id),
            name: id.to_string(),
            popularity,
            slots: slots
                .iter()
                .enumerate()
                .map(|(i, d)| TemplateSlot {
                    id: SlotId::from(format!("{}-{}", id, i)),
                    position: i as u32,
                    target_duration: 2.0,
                    description: d.to_string(),
                    start_offset: 2.0 * i as f64,
                    end_offset: 2.0 * (i + 1) as f64,
                })
                .collect(),
        }
    }

    fn ready(id: &str, description: &str) -> FootageAsset {
        FootageAsset::new(AssetId::from(id), "u", "p", "k")
            .with_description(description)
            .with_status(AssetStatus::Ready)
    }

    #[test]
    fn test_best_covered_template_first() {
        let pool = vec![ready("a", "infinity pool"), ready("b", "beach at sunset")];
        let templates = vec![
            template("gym", 9.0, &["gym", "yoga"]),
            template("resort", 0.0, &["pool", "beach"]),
        ];
        let ranked = rank_templates(&templates, &pool);
        assert_eq!(ranked[0].template_id, TemplateId::from("resort"));
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_popularity_breaks_ties() {
        let templates = vec![template("a", 1.0, &["spa"]), template("b", 5.0, &["spa"])];
        let ranked = rank_templates(&templates, &[]);
        assert_eq!(ranked[0].template_id, TemplateId::from("b"));
        assert_eq!(ranked[0].score, 0.0);
    }
}
