//! In-process store: a row vector and an id counter behind one mutex.

use std::sync::{Mutex, MutexGuard};

use crate::errors::{EcoError, Result};
use crate::ledger::store::{
    sort_newest_first, stamp, ActionStore, Clock, NewRecord, RepairedFields, RowScan, StoredAction,
};
use crate::prediction::NumericField;

#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    rows: Vec<StoredAction>,
    /// Next id to hand out. Never decreases, not even on wipe.
    next_id: i64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Import rows exactly as given (ids included), e.g. a dump from an older
    /// deployment that still carries corrupted numeric columns.
    pub fn load_legacy(&self, rows: Vec<StoredAction>) -> Result<()> {
        let mut g = self.lock("load_legacy")?;
        for row in rows {
            if g.rows.iter().any(|r| r.id == row.id) {
                return Err(EcoError::invalid("id", format!("duplicate id {}", row.id)));
            }
            g.next_id = g.next_id.max(row.id + 1);
            g.rows.push(row);
        }
        g.rows.sort_by_key(|r| r.id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self, context: &'static str) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| EcoError::storage(context, "memory store mutex poisoned"))
    }
}

impl ActionStore for InMemoryStore {
    fn insert(&self, record: NewRecord, clock: &Clock) -> Result<i64> {
        let mut g = self.lock("insert")?;
        let created_at = stamp(clock);
        let id = g.next_id;
        g.next_id += 1;
        g.rows.push(StoredAction {
            id,
            user_id: record.user_id,
            category: record.category,
            confidence: NumericField::Scalar(record.confidence),
            eco_score: NumericField::Scalar(record.eco_score as f64),
            points: NumericField::Scalar(record.points as f64),
            source_tag: record.source_tag,
            created_at,
        });
        Ok(id)
    }

    fn select_by_user(&self, user_id: &str) -> Result<Vec<StoredAction>> {
        // Copy out under the lock, sort outside it.
        let mut rows: Vec<StoredAction> = {
            let g = self.lock("select_by_user")?;
            g.rows.iter().filter(|r| r.user_id == user_id).cloned().collect()
        };
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    fn scan_all(&self) -> Result<RowScan> {
        Ok(RowScan {
            rows: self.lock("scan_all")?.rows.clone(),
            skipped: 0,
        })
    }

    fn rewrite_numeric(&self, id: i64, fields: RepairedFields) -> Result<()> {
        let mut g = self.lock("rewrite_numeric")?;
        let row = g
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EcoError::invalid("id", format!("no row with id {id}")))?;
        row.confidence = NumericField::Scalar(fields.confidence);
        row.eco_score = NumericField::Scalar(fields.eco_score as f64);
        row.points = NumericField::Scalar(fields.points as f64);
        Ok(())
    }

    fn wipe(&self) -> Result<usize> {
        let mut g = self.lock("wipe")?;
        let n = g.rows.len();
        g.rows.clear();
        Ok(n)
    }

    fn ping(&self) -> bool {
        self.inner.lock().is_ok()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
