//! Legacy record repair.
//!
//! Older builds sometimes persisted a whole prediction list into the
//! `confidence`, `eco_score` or `points` column. This pass walks every stored
//! row and collapses such structures back to scalars:
//!
//! | field        | non-empty structure       | empty / unusable |
//! |--------------|---------------------------|------------------|
//! | `confidence` | first element, in [0, 1]  | 0.5              |
//! | `eco_score`  | first element, truncated  | 10               |
//! | `points`     | first element, truncated  | 5                |
//!
//! Rows that are already clean are not written. A second run right after a
//! first one repairs nothing. Rows the store cannot decode at all are counted
//! as skipped and left untouched.

use std::sync::Arc;

use metrics::counter;

use crate::errors::Result;
use crate::ledger::{ActionStore, RepairedFields, RowScan, StoredAction};

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_ECO_SCORE: i64 = 10;
pub const DEFAULT_POINTS: i64 = 5;

/// Repaired numeric fields for `row`, or `None` when nothing needs fixing.
pub fn repair_fields(row: &StoredAction) -> Option<RepairedFields> {
    if row.is_clean() {
        return None;
    }
    let confidence = if row.confidence.is_scalar() {
        row.confidence.repaired_or(DEFAULT_CONFIDENCE)
    } else {
        row.confidence.repaired_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0)
    };
    Some(RepairedFields {
        confidence,
        eco_score: row.eco_score.repaired_or(DEFAULT_ECO_SCORE as f64).trunc() as i64,
        points: row.points.repaired_or(DEFAULT_POINTS as f64).trunc() as i64,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub scanned: usize,
    pub repaired: usize,
    pub skipped: usize,
}

pub struct RecordSanitizer {
    store: Arc<dyn ActionStore>,
}

impl RecordSanitizer {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self { store }
    }

    /// Scan the full record set and rewrite corrupted rows.
    /// Returns the number of rows repaired.
    pub fn sanitize_all(&self) -> Result<usize> {
        Ok(self.run()?.repaired)
    }

    pub fn run(&self) -> Result<SanitizeReport> {
        let RowScan { rows, skipped } = self.store.scan_all()?;
        let mut report = SanitizeReport {
            scanned: rows.len(),
            repaired: 0,
            skipped,
        };
        for row in &rows {
            let Some(fields) = repair_fields(row) else {
                continue;
            };
            self.store.rewrite_numeric(row.id, fields)?;
            report.repaired += 1;
            tracing::info!(
                target: "sanitizer",
                id = row.id,
                confidence = fields.confidence,
                eco_score = fields.eco_score,
                points = fields.points,
                "legacy record repaired"
            );
        }
        counter!("ecoscan_sanitized_records_total").increment(report.repaired as u64);
        tracing::info!(
            target: "sanitizer",
            scanned = report.scanned,
            repaired = report.repaired,
            skipped = report.skipped,
            "sanitize pass finished"
        );
        Ok(report)
    }
}
