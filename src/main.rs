//! Eco-scan service entrypoint.
//! Boots the Axum HTTP server: config, taxonomy, ledger, classifier, routes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;

use ecoscan::api::{self, AppState};
use ecoscan::classifier::FilenameClassifier;
use ecoscan::config::AppConfig;
use ecoscan::logging::init_tracing;
use ecoscan::metrics::Metrics;
use ecoscan::pipeline::ScanService;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    let taxonomy = cfg.load_taxonomy()?;
    let ledger = cfg.open_ledger()?;
    tracing::info!(
        target: "ecoscan",
        taxonomy = %taxonomy.version,
        store = ledger.store().backend(),
        debug_routes = cfg.debug_routes,
        "starting"
    );

    let categories = taxonomy.rules.len();
    let service = ScanService::new(taxonomy, ledger);
    let mut state = AppState::new(service, Arc::new(FilenameClassifier));
    if cfg.debug_routes {
        state = state.with_metrics(Metrics::init(categories)?);
    }

    Ok(api::router(state).into())
}
