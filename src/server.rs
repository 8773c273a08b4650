//! HTTP surface for selection, preview and download.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/login` | Exchange operator credentials for a session cookie |
//! | `POST` | `/logout` | Clear the session cookie |
//! | `GET`  | `/groups` | List directory groups |
//! | `GET`  | `/select?group=&device_id=` | Devices of a group, optionally with one selected |
//! | `GET`  | `/devices/{device_id}/dates` | Distinct dates present in the device's data |
//! | `GET`  | `/devices/{device_id}/preview?start_date=&end_date=` | HTML preview of the most recent days in range |
//! | `GET`  | `/download/{device_id}/{format}?start_date=&end_date=` | Full-range export as an attachment |
//!
//! Everything except `/health`, `/login` and `/logout` sits behind the
//! session gate when `[session]` is configured.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "device not found: ABC123" } }
//! ```
//!
//! Error codes: `bad_request` (400, missing or malformed dates),
//! `unsupported_format` (400), `unauthorized` (401), `not_found` (404,
//! unknown or malformed device id), `no_data` (404),
//! `source_unavailable` (504), `internal` (500). Internal failures are
//! logged in full and answered with a generic message.

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::directory::Directory;
use crate::error::ExportError;
use crate::models::{DateRange, ExportFormat};
use crate::service::{ExportService, Selection};
use crate::session::{token_from_cookie_header, SessionGate, SESSION_COOKIE};
use crate::traits::build_backend;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Export pipeline, including the startup-loaded device directory
    /// (wrapped in `Arc` for cheap cloning across handlers).
    service: Arc<ExportService>,
    /// Session gate for the protected routes. `None` leaves every route open.
    gate: Option<Arc<SessionGate>>,
}

impl AppState {
    pub fn new(service: Arc<ExportService>, gate: Option<Arc<SessionGate>>) -> Self {
        Self { service, gate }
    }
}

/// Starts the HTTP server.
///
/// Loads the device directory, builds the configured storage backend and
/// the session gate, then binds to `[server].bind` and serves until the
/// process is terminated.
///
/// # Arguments
///
/// - `config`: application configuration (directory path, storage backend,
///   policy, session and bind address).
///
/// # Returns
///
/// Returns `Ok(())` when the server shuts down. Returns an error before
/// binding if the directory cannot be loaded, the backend or session gate
/// cannot be built, or the address cannot be bound; no request is served
/// in that case.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let directory = Directory::load(&config.directory.path).await?;
    let backend = build_backend(config)?;
    tracing::info!(
        backend = ?backend.kind(),
        devices = directory.device_count(),
        "storage ready"
    );
    let gate = match &config.session {
        Some(session) => Some(Arc::new(SessionGate::from_config(session)?)),
        None => {
            tracing::warn!("no [session] configured; all routes are open");
            None
        }
    };

    let service = ExportService::new(backend, Arc::new(directory), config);
    let app = build_router(AppState::new(Arc::new(service), gate));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router with CORS and request tracing.
///
/// Routes other than `/health`, `/login` and `/logout` go through the
/// session middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/groups", get(handle_groups))
        .route("/select", get(handle_select))
        .route("/devices/{device_id}/dates", get(handle_dates))
        .route("/devices/{device_id}/preview", get(handle_preview))
        .route("/download/{device_id}/{format}", get(handle_download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        let message = err.to_string();
        match err {
            ExportError::MissingParameter(_) | ExportError::InvalidDate { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            ExportError::UnsupportedFormat(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "unsupported_format", message)
            }
            // A malformed id can never name a dataset, so it reads as unknown.
            ExportError::InvalidDeviceId(_) | ExportError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", message)
            }
            ExportError::EmptyResult { .. } => {
                AppError::new(StatusCode::NOT_FOUND, "no_data", message)
            }
            ExportError::SourceUnavailable { .. } => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, "source_unavailable", message)
            }
            ExportError::Load { .. } | ExportError::Render(_) | ExportError::Configuration(_) => {
                tracing::error!(error = ?err, "request failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal error",
                )
            }
        }
    }
}

fn unauthorized() -> AppError {
    AppError::new(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "a valid session is required",
    )
}

async fn require_session(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(gate) = &state.gate {
        let authorized = req
            .headers()
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(token_from_cookie_header)
            .is_some_and(|token| gate.verify(token, Utc::now()));
        if !authorized {
            return Err(unauthorized());
        }
    }
    Ok(next.run(req).await)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /login, /logout ============

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let Some(gate) = &state.gate else {
        return Ok(Json(serde_json::json!({ "status": "open" })).into_response());
    };
    if !gate.check_credentials(&req.username, &req.password) {
        tracing::warn!(user = %req.username, "rejected login");
        return Err(unauthorized());
    }

    let token = gate.issue(&req.username, Utc::now());
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        gate.lifetime().num_seconds()
    );
    tracing::info!(user = %req.username, "session issued");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "ok" })),
    )
        .into_response())
}

async fn handle_logout() -> Response {
    let cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE);
    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "ok" })),
    )
        .into_response()
}

// ============ Directory ============

#[derive(Serialize)]
struct GroupsResponse {
    groups: Vec<String>,
}

async fn handle_groups(State(state): State<AppState>) -> Json<GroupsResponse> {
    let groups = state
        .service
        .directory()
        .list_groups()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(GroupsResponse { groups })
}

#[derive(Deserialize)]
struct SelectQuery {
    group: Option<String>,
    device_id: Option<String>,
}

async fn handle_select(
    State(state): State<AppState>,
    Query(query): Query<SelectQuery>,
) -> Result<Json<Selection>, AppError> {
    let selection = state
        .service
        .select(query.group.as_deref(), query.device_id.as_deref())?;
    Ok(Json(selection))
}

// ============ Device data ============

#[derive(Deserialize)]
struct RangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl RangeQuery {
    fn range(&self) -> Result<DateRange, ExportError> {
        DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

#[derive(Serialize)]
struct DatesResponse {
    device_id: String,
    dates: Vec<NaiveDate>,
}

async fn handle_dates(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DatesResponse>, AppError> {
    let dates = state.service.available_dates(&device_id).await?;
    Ok(Json(DatesResponse { device_id, dates }))
}

async fn handle_preview(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Html<String>, AppError> {
    let range = query.range()?;
    let preview = state.service.preview(&device_id, &range).await?;
    Ok(Html(preview.html))
}

async fn handle_download(
    State(state): State<AppState>,
    Path((device_id, format)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError> {
    let format = ExportFormat::parse(&format)?;
    let range = query.range()?;
    let artifact = state.service.export(&device_id, &range, format).await?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
