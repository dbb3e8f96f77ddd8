//! Eco-score and points from `(category, confidence)`.
//!
//! eco_score = floor(base_score(category) * clamp(confidence, 0, 1))
//! points    = floor(eco_score * 0.6)
//!
//! Pure: no I/O, no shared state. Non-scalar or non-finite confidences are
//! rejected, never coerced.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::{EcoError, Result};
use crate::prediction::NumericField;
use crate::taxonomy::{Category, Taxonomy};

/// Points are this fraction of the eco-score, as a ratio (3/5 = 0.6) so the
/// floor is exact.
const POINTS_NUM: i64 = 3;
const POINTS_DEN: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EcoScore {
    pub eco_score: i64,
    pub points: i64,
}

#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    taxonomy: Arc<Taxonomy>,
}

impl ScoreCalculator {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn base_score(&self, category: Category) -> u32 {
        self.taxonomy.base_score(category)
    }

    pub fn score(&self, category: Category, confidence: f64) -> Result<EcoScore> {
        if !confidence.is_finite() {
            return Err(EcoError::invalid(
                "confidence",
                format!("non-finite value {confidence}"),
            ));
        }
        let p = confidence.clamp(0.0, 1.0);
        let eco_score = (f64::from(self.base_score(category)) * p).floor() as i64;
        Ok(EcoScore {
            eco_score,
            points: points_for(eco_score),
        })
    }

    /// Same as [`score`](Self::score) for values that have not been checked yet.
    pub fn score_field(&self, category: Category, confidence: &NumericField) -> Result<EcoScore> {
        let c = confidence.require_scalar("confidence")?;
        self.score(category, c)
    }
}

pub fn points_for(eco_score: i64) -> i64 {
    (eco_score * POINTS_NUM).div_euclid(POINTS_DEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calc() -> ScoreCalculator {
        ScoreCalculator::new(Arc::new(Taxonomy::extended()))
    }

    #[test]
    fn mountain_bike_example() {
        let s = calc().score(Category::Bike, 0.76).unwrap();
        assert_eq!(s, EcoScore { eco_score: 68, points: 40 });
    }

    #[test]
    fn formula_holds_across_categories_and_confidences() {
        let c = calc();
        for cat in Category::ALL {
            let base = f64::from(c.base_score(cat));
            for i in 0..=100 {
                let p = f64::from(i) / 100.0;
                let s = c.score(cat, p).unwrap();
                assert_eq!(s.eco_score, (base * p).floor() as i64, "{cat} @ {p}");
                assert_eq!(s.points, s.eco_score * 3 / 5, "{cat} @ {p}");
            }
        }
    }

    #[test]
    fn eco_score_is_monotonic_in_confidence() {
        let c = calc();
        for cat in Category::ALL {
            let mut prev = i64::MIN;
            for i in 0..=1000 {
                let s = c.score(cat, f64::from(i) / 1000.0).unwrap();
                assert!(s.eco_score >= prev, "{cat} dropped at step {i}");
                prev = s.eco_score;
            }
        }
    }

    #[test]
    fn categories_without_a_rule_use_default_base() {
        let merged = ScoreCalculator::new(Arc::new(Taxonomy::merged()));
        let s = merged.score(Category::Helicopter, 1.0).unwrap();
        assert_eq!(s, EcoScore { eco_score: 10, points: 6 });
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let c = calc();
        assert_eq!(c.score(Category::Bike, 1.5).unwrap().eco_score, 90);
        assert_eq!(c.score(Category::Bike, -0.5).unwrap().eco_score, 0);
    }

    #[test]
    fn non_scalar_and_non_finite_are_rejected() {
        let c = calc();
        assert!(c.score(Category::Bike, f64::NAN).is_err());
        let err = c
            .score_field(Category::Bike, &NumericField::Many(vec![json!(0.9)]))
            .unwrap_err();
        assert_eq!(err.code(), "ECO-1001");
        assert_eq!(
            c.score_field(Category::Bike, &NumericField::Scalar(0.5)).unwrap().eco_score,
            45
        );
    }
}
