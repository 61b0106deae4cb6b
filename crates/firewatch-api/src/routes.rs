use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use firewatch_core::models::{NewReport, SyncRequest};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, require_role, JwtVerifier, Principal};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::reports::{Report, ReportPatch, ReportStore, StoredImage};

const SYNC_SCOPES: [&str; 2] = ["reports", "all"];

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    verifier: Arc<JwtVerifier>,
    reports: Arc<ReportStore>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let verifier = Arc::new(JwtVerifier::from_config(&config));
        Self::new(config, verifier)
    }

    pub fn new(config: Arc<AppConfig>, verifier: Arc<JwtVerifier>) -> Self {
        Self {
            config,
            verifier,
            reports: Arc::new(ReportStore::new()),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let image_routes = Router::new()
        .route("/reports/images", post(upload_unattached_image))
        .route("/reports/{id}/images", post(upload_report_image))
        .layer(DefaultBodyLimit::max(state.config.max_image_bytes));

    let protected_routes = Router::new()
        .route("/me", get(current_principal))
        .route("/reports", post(create_report).get(list_reports))
        .route(
            "/reports/{id}",
            get(get_report).patch(update_report).delete(delete_report),
        )
        .route("/sync", post(sync_reports))
        .merge(image_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let principal = state.verifier.verify_access_token(token).await?;
    tracing::debug!(kid = %principal.key_id, role = %principal.role, "Verified bearer token");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn current_principal(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}

async fn create_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<NewReport>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let report = state.reports.create(&principal.subject, input).await?;
    tracing::info!(
        endpoint = "create_report",
        report = %report.id,
        severity = ?report.severity,
        "Accepted fire report"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_reports(State(state): State<AppState>) -> Json<Vec<Report>> {
    Json(state.reports.list().await)
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Report>, AppError> {
    Ok(Json(state.reports.get(&id).await?))
}

async fn update_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(patch): Json<ReportPatch>,
) -> Result<Json<Report>, AppError> {
    let existing = state.reports.get(&id).await?;
    if existing.reporter_id != principal.subject {
        require_role(&principal, &state.config.admin_role)?;
    }

    let report = state.reports.update(&id, patch).await?;
    tracing::info!(
        endpoint = "update_report",
        report = %report.id,
        status = ?report.status,
        "Updated fire report"
    );
    Ok(Json(report))
}

async fn delete_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_role(&principal, &state.config.admin_role)?;
    state.reports.delete(&id).await?;
    tracing::info!(endpoint = "delete_report", report = %id, "Deleted fire report");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_unattached_image(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredImage>), AppError> {
    store_image(&state, &principal, None, &headers, &body).await
}

async fn upload_report_image(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredImage>), AppError> {
    store_image(&state, &principal, Some(&id), &headers, &body).await
}

async fn store_image(
    state: &AppState,
    principal: &Principal,
    report_id: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(StatusCode, Json<StoredImage>), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
        .ok_or_else(|| AppError::bad_request("Content-Type header is required"))?;

    let image = state
        .reports
        .attach_image(&principal.subject, report_id, &content_type, body.len())
        .await?;
    tracing::info!(
        endpoint = "upload_image",
        image = %image.id,
        report = image.report_id.as_deref().unwrap_or("none"),
        size_bytes = image.size_bytes,
        "Stored report image"
    );
    Ok((StatusCode::CREATED, Json(image)))
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    scope: String,
    cursor: i64,
    reports: Vec<Report>,
}

async fn sync_reports(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let scope = request.scope.trim().to_ascii_lowercase();
    if !SYNC_SCOPES.contains(&scope.as_str()) {
        return Err(AppError::bad_request(format!(
            "Unknown sync scope `{}`",
            request.scope
        )));
    }

    let cursor = Utc::now().timestamp_millis();
    let reports = state.reports.updated_since(request.since).await;
    Ok(Json(SyncResponse {
        scope,
        cursor,
        reports,
    }))
}
