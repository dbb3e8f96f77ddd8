//! # Action Ledger
//! Append-only record of scored scans.
//!
//! The ledger validates what it is given, stamps the creation time, and hands
//! the row to an [`ActionStore`], which is the only thing allowed to mint ids.
//! There is no update path; `wipe` exists for administration and is not routed
//! by the HTTP API.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::counter;
use serde::Serialize;

use crate::errors::{EcoError, Result};
use crate::logging::anon_hash;
use crate::prediction::NumericField;
use crate::sanitizer::repair_fields;
use crate::taxonomy::Category;

pub use memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{stamp, ActionStore, Clock, NewRecord, RepairedFields, RowScan, StoredAction};

pub const DEFAULT_SOURCE_TAG: &str = "api";

/// Caller-supplied part of an action. No id, no timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub user_id: String,
    pub category: Category,
    pub confidence: f64,
    pub eco_score: i64,
    pub points: i64,
    pub source_tag: String,
}

impl NewAction {
    /// Build from numbers that have not been type-checked yet. Anything that
    /// is not a plain scalar is rejected; integers must be whole.
    pub fn from_fields(
        user_id: impl Into<String>,
        category: Category,
        confidence: &NumericField,
        eco_score: &NumericField,
        points: &NumericField,
        source_tag: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            user_id: user_id.into(),
            category,
            confidence: confidence.require_scalar("confidence")?,
            eco_score: whole("eco_score", eco_score.require_scalar("eco_score")?)?,
            points: whole("points", points.require_scalar("points")?)?,
            source_tag: source_tag.into(),
        })
    }
}

fn whole(field: &'static str, v: f64) -> Result<i64> {
    if v.fract() != 0.0 {
        return Err(EcoError::invalid(field, format!("expected an integer, got {v}")));
    }
    Ok(v as i64)
}

/// A ledger entry as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub id: i64,
    pub user_id: String,
    pub category: Category,
    pub confidence: f64,
    pub eco_score: i64,
    pub points: i64,
    pub source_tag: String,
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// ISO-8601 / RFC 3339 rendering used by the history surface.
    pub fn created_at_iso(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[derive(Clone)]
pub struct ActionLedger {
    store: Arc<dyn ActionStore>,
    clock: Clock,
}

impl std::fmt::Debug for ActionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLedger")
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl ActionLedger {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self::with_clock(store, Arc::new(Utc::now))
    }

    pub fn with_clock(store: Arc<dyn ActionStore>, clock: Clock) -> Self {
        Self { store, clock }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    /// Validate, timestamp, and persist `action`; returns the store's id.
    /// On error nothing was written.
    pub fn create(&self, action: NewAction) -> Result<i64> {
        validate(&action)?;
        let source_tag = match action.source_tag.trim() {
            "" => DEFAULT_SOURCE_TAG.to_string(),
            t => t.to_string(),
        };
        let record = NewRecord {
            user_id: action.user_id.trim().to_string(),
            category: action.category,
            confidence: action.confidence,
            eco_score: action.eco_score,
            points: action.points,
            source_tag,
        };
        let user_ref = anon_hash(&record.user_id);
        let category = record.category;
        let (eco_score, points) = (record.eco_score, record.points);

        match self.store.insert(record, &self.clock) {
            Ok(id) => {
                counter!("ecoscan_actions_total", "category" => category.as_str()).increment(1);
                tracing::info!(
                    target: "ledger",
                    id, user = %user_ref, %category, eco_score, points,
                    "action recorded"
                );
                Ok(id)
            }
            Err(e) => {
                counter!("ecoscan_storage_errors_total", "op" => "insert").increment(1);
                tracing::warn!(target: "ledger", error = %e, user = %user_ref, "action insert failed");
                Err(e)
            }
        }
    }

    /// All actions of `user_id`, newest first; equal timestamps are ordered by
    /// id, highest first. Unknown users get an empty list.
    pub fn history(&self, user_id: &str) -> Result<Vec<Action>> {
        let rows = self.store.select_by_user(user_id.trim()).inspect_err(|e| {
            counter!("ecoscan_storage_errors_total", "op" => "select").increment(1);
            tracing::warn!(target: "ledger", error = %e, "history read failed");
        })?;
        Ok(rows.into_iter().map(into_action).collect())
    }

    /// Remove every record. Administrative; not reachable from request handling.
    pub fn wipe(&self) -> Result<usize> {
        let n = self.store.wipe()?;
        tracing::warn!(target: "ledger", removed = n, "ledger wiped");
        Ok(n)
    }

    pub fn is_available(&self) -> bool {
        self.store.ping()
    }
}

fn validate(a: &NewAction) -> Result<()> {
    if a.user_id.trim().is_empty() {
        return Err(EcoError::invalid("user_id", "must not be empty"));
    }
    if !a.confidence.is_finite() || !(0.0..=1.0).contains(&a.confidence) {
        return Err(EcoError::invalid(
            "confidence",
            format!("{} is not a probability in [0, 1]", a.confidence),
        ));
    }
    if a.eco_score < 0 {
        return Err(EcoError::invalid("eco_score", format!("negative value {}", a.eco_score)));
    }
    if a.points < 0 {
        return Err(EcoError::invalid("points", format!("negative value {}", a.points)));
    }
    Ok(())
}

/// Rows still carrying legacy structures are repaired in memory only; the
/// stored row is left for the sanitizer.
fn into_action(row: StoredAction) -> Action {
    let fixed = repair_fields(&row);
    if fixed.is_some() {
        tracing::warn!(target: "ledger", id = row.id, "legacy numeric fields read; run the sanitizer");
    }
    let fields = fixed.unwrap_or(RepairedFields {
        confidence: row.confidence.as_scalar().unwrap_or_default(),
        eco_score: row.eco_score.as_scalar().unwrap_or_default() as i64,
        points: row.points.as_scalar().unwrap_or_default() as i64,
    });
    Action {
        id: row.id,
        user_id: row.user_id,
        category: row.category,
        confidence: fields.confidence,
        eco_score: fields.eco_score,
        points: fields.points,
        source_tag: row.source_tag,
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that advances one second per call, starting at `start`.
    fn stepping_clock(start: i64) -> Clock {
        let t = Arc::new(AtomicI64::new(start));
        Arc::new(move || {
            let s = t.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(s, 0).unwrap()
        })
    }

    fn frozen_clock(at: i64) -> Clock {
        Arc::new(move || Utc.timestamp_opt(at, 0).unwrap())
    }

    fn action(user: &str, cat: Category) -> NewAction {
        NewAction {
            user_id: user.into(),
            category: cat,
            confidence: 0.76,
            eco_score: 68,
            points: 40,
            source_tag: "api".into(),
        }
    }

    #[test]
    fn history_is_newest_first() {
        let ledger = ActionLedger::with_clock(Arc::new(InMemoryStore::new()), stepping_clock(1_000));
        let a = ledger.create(action("ana", Category::Bike)).unwrap();
        let b = ledger.create(action("ana", Category::Rideshare)).unwrap();
        let c = ledger.create(action("ana", Category::Train)).unwrap();
        ledger.create(action("bo", Category::Ship)).unwrap();

        let h = ledger.history("ana").unwrap();
        let ids: Vec<i64> = h.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![c, b, a]);
        assert!(h[0].created_at > h[1].created_at && h[1].created_at > h[2].created_at);
        assert!(h.iter().all(|x| x.user_id == "ana"));
    }

    #[test]
    fn equal_timestamps_order_by_id_descending() {
        let ledger = ActionLedger::with_clock(Arc::new(InMemoryStore::new()), frozen_clock(42));
        let ids: Vec<i64> = (0..4)
            .map(|_| ledger.create(action("u", Category::Bike)).unwrap())
            .collect();
        let got: Vec<i64> = ledger.history("u").unwrap().iter().map(|a| a.id).collect();
        let mut want = ids.clone();
        want.reverse();
        assert_eq!(got, want);
    }

    #[test]
    fn unknown_user_has_empty_history() {
        let ledger = ActionLedger::in_memory();
        assert!(ledger.history("ghost").unwrap().is_empty());
    }

    #[test]
    fn create_rejects_bad_input_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ActionLedger::new(store.clone());

        let mut blank = action("  ", Category::Bike);
        assert_eq!(ledger.create(blank.clone()).unwrap_err().code(), "ECO-1001");
        blank.user_id = "u".into();
        blank.confidence = f64::NAN;
        assert!(ledger.create(blank.clone()).is_err());
        blank.confidence = 1.2;
        assert!(ledger.create(blank.clone()).is_err());
        blank.confidence = 0.5;
        blank.points = -1;
        assert!(ledger.create(blank).is_err());

        assert!(store.is_empty());
    }

    #[test]
    fn from_fields_rejects_structures_and_fractions() {
        let scalar = |v: f64| NumericField::Scalar(v);
        let ok = NewAction::from_fields("u", Category::Bike, &scalar(0.5), &scalar(45.0), &scalar(27.0), "api");
        assert!(ok.is_ok());

        let nested = NumericField::Many(vec![json!(0.5)]);
        let err = NewAction::from_fields("u", Category::Bike, &nested, &scalar(45.0), &scalar(27.0), "api")
            .unwrap_err();
        assert!(err.to_string().contains("confidence"));

        let frac = NewAction::from_fields("u", Category::Bike, &scalar(0.5), &scalar(45.5), &scalar(27.0), "api");
        assert!(frac.is_err());
    }

    #[test]
    fn blank_source_tag_defaults_and_timestamps_are_microsecond_precision() {
        let clock: Clock = Arc::new(|| Utc.timestamp_opt(10, 123_456_789).unwrap());
        let ledger = ActionLedger::with_clock(Arc::new(InMemoryStore::new()), clock);
        let mut a = action("u", Category::Bike);
        a.source_tag = " ".into();
        ledger.create(a).unwrap();
        let h = ledger.history("u").unwrap();
        assert_eq!(h[0].source_tag, DEFAULT_SOURCE_TAG);
        assert_eq!(h[0].created_at, Utc.timestamp_opt(10, 123_456_000).unwrap());
        assert_eq!(h[0].created_at_iso(), "1970-01-01T00:00:10.123456Z");
    }

    #[test]
    fn legacy_rows_are_repaired_on_read_without_writing() {
        let store = Arc::new(InMemoryStore::new());
        store
            .load_legacy(vec![StoredAction {
                id: 7,
                user_id: "u".into(),
                category: Category::Bike,
                confidence: NumericField::Many(vec![json!(0.8), json!(0.1)]),
                eco_score: NumericField::Many(vec![]),
                points: NumericField::Scalar(3.0),
                source_tag: "api".into(),
                created_at: Utc.timestamp_opt(0, 0).unwrap() + Duration::seconds(5),
            }])
            .unwrap();
        let ledger = ActionLedger::new(store.clone());
        let h = ledger.history("u").unwrap();
        assert_eq!(h[0].confidence, 0.8);
        assert_eq!(h[0].eco_score, 10);
        assert_eq!(h[0].points, 3);
        // still corrupted in the store
        assert!(!store.scan_all().unwrap().rows[0].is_clean());
    }

    #[test]
    fn wipe_clears_everything() {
        let ledger = ActionLedger::in_memory();
        ledger.create(action("a", Category::Bike)).unwrap();
        ledger.create(action("b", Category::Bike)).unwrap();
        assert_eq!(ledger.wipe().unwrap(), 2);
        assert!(ledger.history("a").unwrap().is_empty());
    }
}
