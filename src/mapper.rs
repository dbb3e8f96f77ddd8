//! Label mapping: raw classifier predictions → one category + confidence.
//!
//! Rules:
//! - empty input → `(unsustainable, fallback_confidence)`
//! - every prediction is visited once; its label is normalized and classified
//!   against the taxonomy's keyword table (first rule in priority order wins)
//! - among matched predictions the strictly highest confidence wins; on ties
//!   the earliest one in input order stays
//! - nothing matched → `(unsustainable, confidence of the first prediction)`
//!
//! The returned confidence is always the winning prediction's own value.

use std::sync::Arc;

use crate::prediction::Prediction;
use crate::taxonomy::{normalize_label, Category, Taxonomy};

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub category: Category,
    pub confidence: f64,
    /// Normalized label that produced the category; `None` for fallbacks.
    pub matched_label: Option<String>,
}

impl Mapping {
    fn fallback(confidence: f64) -> Self {
        Self {
            category: Category::Unsustainable,
            confidence,
            matched_label: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelMapper {
    taxonomy: Arc<Taxonomy>,
}

impl LabelMapper {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn map(&self, predictions: &[Prediction]) -> Mapping {
        let default_conf = self.taxonomy.fallback_confidence;
        let Some(first) = predictions.first() else {
            return Mapping::fallback(default_conf);
        };

        let mut best: Option<Mapping> = None;
        for p in predictions {
            let Some(conf) = p.resolved_confidence() else {
                tracing::debug!(target: "scan", label = %p.label, "prediction without usable confidence skipped");
                continue;
            };
            let label = normalize_label(&p.label);
            let Some(category) = self.taxonomy.classify(&label) else {
                continue;
            };
            let better = best.as_ref().map_or(true, |b| conf > b.confidence);
            if better {
                best = Some(Mapping {
                    category,
                    confidence: conf,
                    matched_label: Some(label),
                });
            }
        }

        best.unwrap_or_else(|| Mapping::fallback(first.resolved_confidence().unwrap_or(default_conf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::NumericField;
    use rand::seq::SliceRandom;
    use serde_json::json;

    fn mapper() -> LabelMapper {
        LabelMapper::new(Arc::new(Taxonomy::extended()))
    }

    fn p(label: &str, c: f64) -> Prediction {
        Prediction::new(label, c)
    }

    #[test]
    fn empty_input_uses_fixed_default() {
        let m = mapper().map(&[]);
        assert_eq!(m.category, Category::Unsustainable);
        assert_eq!(m.confidence, 0.5);
        assert!(m.matched_label.is_none());
    }

    #[test]
    fn highest_confidence_match_wins_regardless_of_order() {
        let m = mapper().map(&[p("bicycle", 0.4), p("car", 0.9)]);
        assert_eq!((m.category, m.confidence), (Category::Rideshare, 0.9));

        let m = mapper().map(&[p("car", 0.9), p("bicycle", 0.4)]);
        assert_eq!((m.category, m.confidence), (Category::Rideshare, 0.9));
    }

    #[test]
    fn shuffled_input_gives_the_same_winner() {
        let mut preds = vec![
            p("golden retriever", 0.95),
            p("mountain bike", 0.76),
            p("trolleybus", 0.31),
            p("coffee mug", 0.12),
            p("tabby cat", 0.88),
        ];
        let mut rng = rand::rng();
        for _ in 0..20 {
            preds.shuffle(&mut rng);
            let m = mapper().map(&preds);
            assert_eq!((m.category, m.confidence), (Category::Bike, 0.76));
        }
    }

    #[test]
    fn unmatched_labels_fall_back_to_first_prediction() {
        let m = mapper().map(&[p("unmatched_label", 0.3)]);
        assert_eq!((m.category, m.confidence), (Category::Unsustainable, 0.3));

        let m = mapper().map(&[p("tabby cat", 0.2), p("golden retriever", 0.9)]);
        assert_eq!((m.category, m.confidence), (Category::Unsustainable, 0.2));
    }

    #[test]
    fn ties_keep_the_first_match() {
        let m = mapper().map(&[p("cup", 0.6), p("taxi", 0.6), p("bus", 0.6)]);
        assert_eq!(m.category, Category::ReusableContainer);
        assert_eq!(m.matched_label.as_deref(), Some("cup"));
    }

    #[test]
    fn zero_confidence_is_a_valid_match() {
        let m = mapper().map(&[p("bicycle", 0.0), p("tabby", 0.9)]);
        assert_eq!((m.category, m.confidence), (Category::Bike, 0.0));
    }

    #[test]
    fn wrapped_confidences_are_unwrapped_and_broken_ones_skipped() {
        let preds = vec![
            Prediction {
                label: "bus".into(),
                confidence: NumericField::Many(vec![json!([0.7, 0.2])]),
            },
            Prediction {
                label: "bicycle".into(),
                confidence: NumericField::Many(vec![]),
            },
        ];
        let m = mapper().map(&preds);
        assert_eq!((m.category, m.confidence), (Category::PublicTransport, 0.7));
    }

    #[test]
    fn null_bool_and_object_confidences_are_skipped() {
        for odd in [json!(null), json!(true), json!({"p": 0.9})] {
            let preds = vec![
                p("tabby", 0.3),
                Prediction {
                    label: "bicycle".into(),
                    confidence: NumericField::Other(odd.clone()),
                },
                p("bus", 0.7),
            ];
            let m = mapper().map(&preds);
            assert_eq!((m.category, m.confidence), (Category::PublicTransport, 0.7), "{odd}");
        }
    }

    #[test]
    fn unusable_first_confidence_falls_back_to_default() {
        let preds = vec![Prediction {
            label: "tabby".into(),
            confidence: NumericField::Text("high".into()),
        }];
        let m = mapper().map(&preds);
        assert_eq!((m.category, m.confidence), (Category::Unsustainable, 0.5));
    }

    #[test]
    fn merged_taxonomy_folds_rail_into_public_transport() {
        let m = LabelMapper::new(Arc::new(Taxonomy::merged()))
            .map(&[p("electric locomotive", 0.81)]);
        assert_eq!((m.category, m.confidence), (Category::PublicTransport, 0.81));
    }
}
