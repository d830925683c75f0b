//! HTTP routing layer

use crate::context::AppContext;
use crate::error::{PipelineError, UploadError};
use crate::metrics::MetricsSnapshot;
use crate::types::prediction::{PredictionKind, StoredPrediction};
use crate::types::request::{OwnerId, PredictionRequest};
use crate::types::upload::UploadRecord;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Form field carrying the uploaded document
const UPLOAD_FIELD: &str = "pdf_file";

type AppState = Arc<AppContext>;

/// Build the service router
pub fn router(ctx: Arc<AppContext>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/predict/survival", post(predict_survival))
        .route("/predict/sepsis", post(predict_sepsis))
        .route("/history/survival", get(survival_history))
        .route("/history/sepsis", get(sepsis_history))
        .route("/dashboard", get(dashboard))
        .route("/uploads", get(list_uploads).post(upload_pdf))
        .route("/uploads/:filename", get(download_pdf))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Error surfaced to HTTP callers
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Pipeline(PipelineError),
    Upload(UploadError),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        ApiError::Upload(e)
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error() -> Response {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                error_body(StatusCode::UNAUTHORIZED, "authentication required")
            }
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, message),
            ApiError::Pipeline(e) if e.is_user_correctable() => {
                let field = match &e {
                    PipelineError::MissingField { field } => Some(field.clone()),
                    PipelineError::InvalidValue { field, .. } => Some(field.clone()),
                    _ => None,
                };
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": e.to_string(), "field": field })),
                )
                    .into_response()
            }
            // Logged by the pipeline with full detail
            ApiError::Pipeline(_) => internal_error(),
            ApiError::Upload(e @ (UploadError::NotPdf { .. } | UploadError::EmptyFilename)) => {
                error_body(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Upload(e @ UploadError::NotFound { .. }) => {
                error_body(StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Upload(e) => {
                error!(error = %e, "Upload storage failed");
                internal_error()
            }
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                internal_error()
            }
        }
    }
}

/// Owner identity asserted by the upstream authentication layer
fn owner_from(headers: &HeaderMap, ctx: &AppContext) -> Result<OwnerId, ApiError> {
    let value = headers
        .get(ctx.owner_header.as_str())
        .ok_or(ApiError::Unauthorized)?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(OwnerId)
        .ok_or_else(|| {
            warn!(header = %ctx.owner_header, "Malformed owner header");
            ApiError::Unauthorized
        })
}

/// Run store- and model-bound work off the async executor
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Dashboard {
    recent_sepsis: Vec<StoredPrediction>,
    recent_uploads: Vec<UploadRecord>,
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(ctx): State<AppState>) -> Json<MetricsSnapshot> {
    Json(ctx.metrics.snapshot())
}

async fn predict(
    ctx: AppState,
    headers: HeaderMap,
    kind: PredictionKind,
    fields: HashMap<String, String>,
) -> Result<(StatusCode, Json<StoredPrediction>), ApiError> {
    let owner = owner_from(&headers, &ctx)?;
    let request = PredictionRequest::from(fields);

    let stored = blocking(move || Ok(ctx.pipeline.submit(owner, kind, request)?)).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn predict_survival(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<StoredPrediction>), ApiError> {
    predict(ctx, headers, PredictionKind::Survival, fields).await
}

async fn predict_sepsis(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<StoredPrediction>), ApiError> {
    predict(ctx, headers, PredictionKind::SepsisRisk, fields).await
}

async fn history(
    ctx: AppState,
    headers: HeaderMap,
    kind: PredictionKind,
    limit: Option<usize>,
) -> Result<Json<Vec<StoredPrediction>>, ApiError> {
    let owner = owner_from(&headers, &ctx)?;
    let rows = blocking(move || Ok(ctx.pipeline.history(owner, kind, limit)?)).await?;
    Ok(Json(rows))
}

async fn survival_history(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredPrediction>>, ApiError> {
    history(ctx, headers, PredictionKind::Survival, query.limit).await
}

async fn sepsis_history(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredPrediction>>, ApiError> {
    history(ctx, headers, PredictionKind::SepsisRisk, query.limit).await
}

async fn dashboard(
    State(ctx): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Dashboard>, ApiError> {
    let owner = owner_from(&headers, &ctx)?;

    let dashboard = blocking(move || {
        let limit = Some(ctx.recent_limit);
        Ok(Dashboard {
            recent_sepsis: ctx
                .pipeline
                .history(owner, PredictionKind::SepsisRisk, limit)?,
            recent_uploads: ctx.uploads.list(owner, limit)?,
        })
    })
    .await?;

    Ok(Json(dashboard))
}

async fn upload_pdf(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadRecord>), ApiError> {
    let owner = owner_from(&headers, &ctx)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = match upload {
        Some((filename, bytes)) if !filename.is_empty() => (filename, bytes),
        _ => return Err(ApiError::BadRequest("Please choose a PDF file.".to_string())),
    };

    let record = blocking(move || Ok(ctx.uploads.save(owner, &filename, &bytes)?)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_uploads(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<UploadRecord>>, ApiError> {
    let owner = owner_from(&headers, &ctx)?;
    let records = blocking(move || Ok(ctx.uploads.list(owner, query.limit)?)).await?;
    Ok(Json(records))
}

async fn download_pdf(
    State(ctx): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let owner = owner_from(&headers, &ctx)?;
    let name = filename.clone();
    let bytes = blocking(move || Ok(ctx.uploads.read(owner, &name)?)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
