//! Storage boundary of the ledger.
//!
//! The physical layout is one flat table: id (store-generated primary key),
//! user id, category, confidence, eco score, points, source tag, creation
//! timestamp. Numeric columns are read back as [`NumericField`] because rows
//! written by older builds may hold a whole prediction list there.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use crate::errors::Result;
use crate::prediction::NumericField;
use crate::taxonomy::Category;

/// Source of creation timestamps. Swappable so tests can pin time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Read `clock` at the precision every backend stores (microseconds).
/// Stores call this inside the critical section that assigns the id, so id
/// order and time order agree.
pub fn stamp(clock: &Clock) -> DateTime<Utc> {
    clock().trunc_subsecs(6)
}

/// A validated row about to be written. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub user_id: String,
    pub category: Category,
    pub confidence: f64,
    pub eco_score: i64,
    pub points: i64,
    pub source_tag: String,
}

/// A row as it sits in the store, possibly with legacy numeric corruption.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAction {
    pub id: i64,
    pub user_id: String,
    pub category: Category,
    pub confidence: NumericField,
    pub eco_score: NumericField,
    pub points: NumericField,
    pub source_tag: String,
    pub created_at: DateTime<Utc>,
}

impl StoredAction {
    pub fn is_clean(&self) -> bool {
        self.confidence.is_scalar() && self.eco_score.is_scalar() && self.points.is_scalar()
    }
}

/// Replacement values for the three numeric columns of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairedFields {
    pub confidence: f64,
    pub eco_score: i64,
    pub points: i64,
}

/// Result of a full-table read. Rows that cannot be decoded at all (unknown
/// category, unparseable timestamp) are counted instead of failing the read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowScan {
    pub rows: Vec<StoredAction>,
    pub skipped: usize,
}

/// Minimal create/query surface the ledger needs from persistence.
///
/// Implementations must make `insert` atomic: the id is generated and the row
/// becomes visible in one step, or nothing is written.
pub trait ActionStore: Send + Sync {
    /// Persist `record`, stamped with [`stamp`]`(clock)` while the id is
    /// assigned, and return the id. Ids are strictly increasing and never
    /// reused, including across `wipe`.
    fn insert(&self, record: NewRecord, clock: &Clock) -> Result<i64>;

    /// All rows for `user_id`, newest `created_at` first, ties by id descending.
    /// Undecodable rows are left out.
    fn select_by_user(&self, user_id: &str) -> Result<Vec<StoredAction>>;

    /// Every row, in id order. Maintenance only.
    fn scan_all(&self) -> Result<RowScan>;

    /// Overwrite the numeric columns of row `id`. Maintenance only.
    fn rewrite_numeric(&self, id: i64, fields: RepairedFields) -> Result<()>;

    /// Delete every row and return how many were removed. Administrative only.
    fn wipe(&self) -> Result<usize>;

    /// Cheap liveness check for health reporting.
    fn ping(&self) -> bool;

    fn backend(&self) -> &'static str;
}

/// History order shared by the backends that sort in memory.
pub(crate) fn sort_newest_first(rows: &mut [StoredAction]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
