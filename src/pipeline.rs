//! # Scan pipeline
//! predictions → [`LabelMapper`] → [`ScoreCalculator`] → [`ActionLedger::create`]
//!
//! Mapping and scoring cannot fail on well-typed input; the only failure that
//! reaches the caller is the ledger's. A failed scan never yields an outcome.

use std::sync::Arc;

use metrics::{counter, histogram};
use serde::Serialize;

use crate::errors::{EcoError, Result};
use crate::ledger::{ActionLedger, NewAction, DEFAULT_SOURCE_TAG};
use crate::logging::anon_hash;
use crate::mapper::LabelMapper;
use crate::prediction::Prediction;
use crate::scoring::ScoreCalculator;
use crate::taxonomy::{Category, Taxonomy};

/// Result handed to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub user_id: String,
    pub category: Category,
    pub confidence: f64,
    pub eco_score: i64,
    pub points: i64,
    pub message: String,
    pub ledger_id: i64,
}

pub fn recognition_message(category: Category) -> String {
    format!("Action recognized: {category}.")
}

#[derive(Debug, Clone)]
pub struct ScanService {
    mapper: LabelMapper,
    scorer: ScoreCalculator,
    ledger: ActionLedger,
    taxonomy: Arc<Taxonomy>,
}

impl ScanService {
    pub fn new(taxonomy: Arc<Taxonomy>, ledger: ActionLedger) -> Self {
        Self {
            mapper: LabelMapper::new(taxonomy.clone()),
            scorer: ScoreCalculator::new(taxonomy.clone()),
            ledger,
            taxonomy,
        }
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn scan(
        &self,
        user_id: &str,
        predictions: &[Prediction],
        source_tag: Option<&str>,
    ) -> Result<ScanOutcome> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(EcoError::invalid("user_id", "must not be empty"));
        }

        let mapping = self.mapper.map(predictions);
        let score = self.scorer.score(mapping.category, mapping.confidence)?;

        tracing::debug!(
            target: "scan",
            user = %anon_hash(user_id),
            predictions = predictions.len(),
            matched = ?mapping.matched_label,
            category = %mapping.category,
            confidence = mapping.confidence,
            taxonomy = %self.taxonomy.version,
            "mapped predictions"
        );

        let created = self.ledger.create(NewAction {
            user_id: user_id.to_string(),
            category: mapping.category,
            confidence: mapping.confidence,
            eco_score: score.eco_score,
            points: score.points,
            source_tag: source_tag.unwrap_or(DEFAULT_SOURCE_TAG).to_string(),
        });
        let ledger_id = match created {
            Ok(id) => id,
            Err(e) => {
                counter!("ecoscan_scans_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        };

        counter!("ecoscan_scans_total", "outcome" => "recorded").increment(1);
        histogram!("ecoscan_eco_score").record(score.eco_score as f64);

        Ok(ScanOutcome {
            user_id: user_id.to_string(),
            category: mapping.category,
            confidence: mapping.confidence,
            eco_score: score.eco_score,
            points: score.points,
            message: recognition_message(mapping.category),
            ledger_id,
        })
    }
}
