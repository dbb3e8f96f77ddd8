use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe the
    /// series the service emits. Later calls reuse the first handle.
    pub fn init(taxonomy_categories: usize) -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())?
            .clone();

        describe_counter!("ecoscan_actions_total", "Actions written to the ledger, by category.");
        describe_counter!(
            "ecoscan_storage_errors_total",
            "Ledger reads/writes that failed in the store."
        );
        describe_counter!(
            "ecoscan_sanitized_records_total",
            "Legacy records repaired by the sanitizer."
        );
        describe_counter!("ecoscan_scans_total", "Scan requests, by outcome.");
        describe_histogram!("ecoscan_eco_score", "Eco-score of recorded actions.");
        describe_gauge!(
            "ecoscan_taxonomy_categories",
            "Number of categories in the active taxonomy."
        );

        gauge!("ecoscan_taxonomy_categories").set(taxonomy_categories as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
