// src/lib.rs
// Public library surface for the service binary, the admin CLI, and integration tests.

pub mod api;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod mapper;
pub mod metrics;
pub mod pipeline;
pub mod prediction;
pub mod sanitizer;
pub mod scoring;
pub mod taxonomy;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::errors::{EcoError, Result};
pub use crate::ledger::{Action, ActionLedger, ActionStore, NewAction};
pub use crate::mapper::{LabelMapper, Mapping};
pub use crate::pipeline::{ScanOutcome, ScanService};
pub use crate::prediction::{NumericField, Prediction};
pub use crate::sanitizer::RecordSanitizer;
pub use crate::scoring::{EcoScore, ScoreCalculator};
pub use crate::taxonomy::{Category, Taxonomy};
