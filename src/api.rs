use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, FromRequest, Multipart, Path, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tower_http::cors::CorsLayer;

use crate::classifier::{Classifier, FilenameClassifier, ScanInput};
use crate::errors::EcoError;
use crate::ledger::{Action, ActionLedger};
use crate::metrics::Metrics;
use crate::pipeline::{ScanOutcome, ScanService};
use crate::prediction::Prediction;
use crate::taxonomy::{Category, Taxonomy};

#[derive(Clone)]
pub struct AppState {
    pub service: ScanService,
    pub classifier: Arc<dyn Classifier>,
    /// Present only when debug routes are on; adds `/metrics`.
    pub metrics: Option<Arc<Metrics>>,
}

impl AppState {
    pub fn new(service: ScanService, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            service,
            classifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    /// Extended taxonomy, in-memory ledger, filename classifier.
    pub fn in_memory() -> Self {
        let service = ScanService::new(Arc::new(Taxonomy::extended()), ActionLedger::in_memory());
        Self::new(service, Arc::new(FilenameClassifier))
    }

    pub fn ledger(&self) -> &ActionLedger {
        self.service.ledger()
    }
}

/// Upper bound on a scan request body, image uploads included.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/ecoscan", post(ecoscan))
        .route("/api/v1/history/{user_id}", get(history));
    if let Some(m) = &state.metrics {
        app = app.merge(m.router::<AppState>());
    }
    app.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub fn create_router(state: AppState) -> Router {
    router(state)
}

// ---------- errors ----------

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

pub enum ApiError {
    Eco(EcoError),
    /// A blocking ledger task panicked or was cancelled.
    Worker(JoinError),
}

impl From<EcoError> for ApiError {
    fn from(e: EcoError) -> Self {
        Self::Eco(e)
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        Self::Worker(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::Eco(EcoError::invalid("body", r.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(r: MultipartRejection) -> Self {
        Self::Eco(EcoError::invalid("body", r.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::Eco(EcoError::invalid("body", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            Self::Eco(e) => e,
            Self::Worker(e) => {
                tracing::error!(target: "api", error = %e, "blocking task failed");
                let body = ErrorBody {
                    error: "internal worker failure".into(),
                    code: "ECO-5001",
                };
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };
        let status = match &e {
            EcoError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EcoError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EcoError::Classifier { .. } => StatusCode::BAD_GATEWAY,
            EcoError::Taxonomy { .. } | EcoError::CorruptRecord { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: e.to_string(),
            code: e.code(),
        };
        let mut resp = (status, Json(body)).into_response();
        if e.is_transient() {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        resp
    }
}

// ---------- /health ----------

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    model_loaded: bool,
    model_name: &'static str,
    database_connection: bool,
    taxonomy_version: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let model_loaded = state.classifier.is_ready();
    let database_connection = state.ledger().is_available();
    Json(HealthResp {
        status: if model_loaded && database_connection {
            "ok"
        } else {
            "degraded"
        },
        model_loaded,
        model_name: state.classifier.name(),
        database_connection,
        taxonomy_version: state.service.taxonomy().version.clone(),
    })
}

// ---------- /api/v1/ecoscan ----------

#[derive(Debug, Deserialize)]
struct ScanReq {
    user_id: String,
    #[serde(default)]
    predictions: Option<Vec<Prediction>>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    source_tag: Option<String>,
}

/// `multipart/form-data` form of [`ScanReq`]: text fields `user_id`,
/// `source_tag` and `filename`, plus the `image` file part.
async fn read_upload(mut form: Multipart) -> Result<(ScanReq, Option<Vec<u8>>), ApiError> {
    let mut req = ScanReq {
        user_id: String::new(),
        predictions: None,
        filename: None,
        source_tag: None,
    };
    let mut image = None;
    while let Some(field) = form.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => req.user_id = field.text().await?,
            "source_tag" => req.source_tag = Some(field.text().await?),
            "filename" => req.filename = Some(field.text().await?),
            "image" => {
                if req.filename.is_none() {
                    req.filename = field.file_name().map(str::to_string);
                }
                image = Some(field.bytes().await?.to_vec());
            }
            other => tracing::debug!(target: "api", field = other, "unknown upload field ignored"),
        }
    }
    if req.user_id.is_empty() {
        return Err(EcoError::invalid("user_id", "missing from upload").into());
    }
    if image.is_none() {
        return Err(EcoError::invalid("image", "missing from upload").into());
    }
    Ok((req, image))
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

async fn ecoscan(State(state): State<AppState>, request: Request) -> Result<Json<ScanOutcome>, ApiError> {
    let (req, image) = if is_multipart(&request) {
        read_upload(Multipart::from_request(request, &state).await?).await?
    } else {
        let Json(req) = Json::<ScanReq>::from_request(request, &state).await?;
        (req, None)
    };

    // Explicit predictions win; otherwise ask the classifier.
    let predictions = match req.predictions {
        Some(p) => p,
        None => {
            let input = ScanInput {
                filename: req.filename,
                image,
            };
            state
                .classifier
                .classify(&input)
                .await
                .map_err(|e| EcoError::Classifier {
                    name: state.classifier.name(),
                    details: format!("{e:#}"),
                })?
        }
    };

    let service = state.service.clone();
    let (user_id, source_tag) = (req.user_id, req.source_tag);
    let outcome = tokio::task::spawn_blocking(move || {
        service.scan(&user_id, &predictions, source_tag.as_deref())
    })
    .await??;
    Ok(Json(outcome))
}

// ---------- /api/v1/history/{user_id} ----------

#[derive(Debug, Serialize)]
struct HistoryItem {
    created_at: String,
    category: Category,
    eco_score: i64,
    points: i64,
}

impl From<&Action> for HistoryItem {
    fn from(a: &Action) -> Self {
        Self {
            created_at: a.created_at_iso(),
            category: a.category,
            eco_score: a.eco_score,
            points: a.points,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryResp {
    user_id: String,
    history: Vec<HistoryItem>,
}

async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResp>, ApiError> {
    let ledger = state.ledger().clone();
    let uid = user_id.clone();
    let actions = tokio::task::spawn_blocking(move || ledger.history(&uid)).await??;
    Ok(Json(HistoryResp {
        history: actions.iter().map(HistoryItem::from).collect(),
        user_id,
    }))
}
