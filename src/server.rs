//! HTTP API server.
//!
//! Exposes the two workflows over a JSON HTTP API so the generator can run as
//! a shared service instead of a local CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/new-check` | Run the check creation workflow |
//! | `POST` | `/update-compliance` | Attach checks to a compliance document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "invalid_argument", "message": "user query must not be empty" } }
//! ```
//!
//! Generation failures additionally carry the workflow step that failed in a
//! `step` field. Client and configuration mistakes map to 400, upstream model
//! and embedding failures to 502, everything else to 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::StudioError;
use crate::llm;
use crate::models::{ComplianceDocument, GeneratedCheck, RelatedCheck};
use crate::store::VectorStore;
use crate::workflow::{check_creation, compliance};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<VectorStore>,
}

/// Starts the HTTP API server.
///
/// Opens the vector store once (failing fast on a missing or mismatched
/// index), binds to `[server].bind`, and serves until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let store = VectorStore::connect(&config.store.path, &config.embedding, None).await?;
    store.require_index().await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/new-check", post(handle_new_check))
        .route("/update-compliance", post(handle_update_compliance))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body shared by all endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_argument"`).
    code: String,
    /// Workflow step for generation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    step: Option<String>,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                step: self.step,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StudioError> for AppError {
    fn from(err: StudioError) -> Self {
        let status = match &err {
            StudioError::InvalidArgument(_)
            | StudioError::Configuration(_)
            | StudioError::MalformedCheck { .. }
            | StudioError::IndexAlreadyExists { .. }
            | StudioError::EmbeddingModelMismatch { .. } => StatusCode::BAD_REQUEST,
            StudioError::GenerationFailed { .. } | StudioError::EmbeddingProvider(_) => {
                StatusCode::BAD_GATEWAY
            }
            StudioError::IndexCorrupt { .. }
            | StudioError::Database(_)
            | StudioError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            step: err.step().map(str::to_string),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /new-check ============

/// JSON request body for `POST /new-check`.
#[derive(Deserialize)]
struct NewCheckRequest {
    /// Natural-language description of the check to create.
    user_query: String,
    /// Also generate a remediation function.
    #[serde(default)]
    with_fixer: bool,
    /// Override the configured model provider for this request.
    model_provider: Option<String>,
    /// Override the configured model reference for this request.
    model_reference: Option<String>,
    /// API key for the model provider; falls back to the provider's
    /// environment variable.
    api_key: Option<String>,
}

/// JSON response body for `POST /new-check`.
#[derive(Serialize)]
struct NewCheckResponse {
    /// `"generated"` or `"already_covered"`.
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<GeneratedCheck>,
    /// Existing checks that already cover the request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    existing: Vec<RelatedCheck>,
}

/// Handler for `POST /new-check`.
///
/// Runs the full check creation workflow. The model is instantiated per
/// request so provider overrides and key problems surface as request errors
/// rather than poisoning server state.
async fn handle_new_check(
    State(state): State<AppState>,
    Json(request): Json<NewCheckRequest>,
) -> Result<Json<NewCheckResponse>, AppError> {
    let provider = request
        .model_provider
        .as_deref()
        .unwrap_or(&state.config.models.llm_provider);
    let reference = request
        .model_reference
        .as_deref()
        .unwrap_or(&state.config.models.llm_reference);

    let model = llm::create_model(
        provider,
        reference,
        request.api_key.clone(),
        state.config.models.timeout_secs,
    )?;

    let outcome = check_creation::run(
        &state.store,
        model.as_ref(),
        &state.config.retrieval,
        &check_creation::CheckCreationRequest {
            user_query: request.user_query,
            with_fixer: request.with_fixer,
        },
    )
    .await?;

    let response = match outcome {
        check_creation::CheckCreationOutcome::Generated(check) => NewCheckResponse {
            outcome: "generated".to_string(),
            check: Some(check),
            existing: Vec::new(),
        },
        check_creation::CheckCreationOutcome::AlreadyCovered { existing } => NewCheckResponse {
            outcome: "already_covered".to_string(),
            check: None,
            existing,
        },
    };
    Ok(Json(response))
}

// ============ POST /update-compliance ============

/// JSON request body for `POST /update-compliance`. The document is updated
/// and returned; the caller owns persistence.
#[derive(Deserialize)]
struct UpdateComplianceRequest {
    document: ComplianceDocument,
    /// Override the configured per-requirement attachment cap.
    max_checks_per_requirement: Option<usize>,
    /// Override the configured similarity threshold.
    confidence_threshold: Option<f32>,
}

/// JSON response body for `POST /update-compliance`.
#[derive(Serialize)]
struct UpdateComplianceResponse {
    document: ComplianceDocument,
    requirements_processed: usize,
    checks_attached: usize,
}

/// Handler for `POST /update-compliance`.
async fn handle_update_compliance(
    State(state): State<AppState>,
    Json(request): Json<UpdateComplianceRequest>,
) -> Result<Json<UpdateComplianceResponse>, AppError> {
    let max_checks = request
        .max_checks_per_requirement
        .unwrap_or(state.config.retrieval.max_checks_per_requirement);
    let threshold = request
        .confidence_threshold
        .unwrap_or(state.config.retrieval.confidence_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(StudioError::InvalidArgument(
            "confidence_threshold must be between 0.0 and 1.0".to_string(),
        )
        .into());
    }

    let mut document = request.document;
    let report =
        compliance::update_compliance(&state.store, &mut document, max_checks, threshold).await?;

    Ok(Json(UpdateComplianceResponse {
        document,
        requirements_processed: report.requirements_processed,
        checks_attached: report.checks_attached,
    }))
}
