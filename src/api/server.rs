//! HTTP server for the isarest API.
//!
//! Provides REST endpoints for format conversion, document validation,
//! study imports and study-design generation.
//!
//! # API Endpoints
//!
//! | Method | Path                             | Description                         |
//! |--------|----------------------------------|-------------------------------------|
//! | GET    | `/health`                        | Health check                        |
//! | POST   | `/api/v1/convert/tab-to-json`    | ISA-Tab archive to ISA-JSON         |
//! | POST   | `/api/v1/convert/json-to-tab`    | ISA-JSON to ISA-Tab archive         |
//! | POST   | `/api/v1/convert/tab-to-sra`     | ISA-Tab archive to SRA archive      |
//! | POST   | `/api/v1/convert/json-to-sra`    | zipped ISA-JSON to SRA archive      |
//! | POST   | `/api/v1/convert/tab-to-cedar`   | ISA-Tab archive to CEDAR JSON       |
//! | POST   | `/api/v1/validate/json`          | Validate an ISA-JSON document       |
//! | POST   | `/api/v1/validate/tab`           | Validate an ISA-Tab archive         |
//! | GET    | `/api/v1/import/external/{id}`   | Import a study archive by id        |
//! | POST   | `/api/v1/design/generate`        | Generate a study from a design      |
//! | GET    | `/api/logs`                      | SSE stream for real-time logs       |

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, Method},
    response::{sse::Event, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::outcome_response;
use crate::archive::InputPayload;
use crate::arena::Arena;
use crate::config::Config;
use crate::convert::dispatch::Dispatcher;
use crate::convert::external::{CliConverter, CliGenerator, CliValidator};
use crate::convert::{Format, Outcome, MIME_JSON};
use crate::design::generate::{run_design_request, DesignGenerator};
use crate::design::ValidationLimits;
use crate::error::{ServiceError, ServiceResult};
use crate::import::ExternalImporter;

/// Upload size ceiling; converted archives can be large.
const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Shared, read-only state for all handlers.
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    generator: Arc<dyn DesignGenerator>,
    importer: ExternalImporter,
    limits: ValidationLimits,
}

/// Build the router for the given state. Split from [`start_server`] so
/// tests can drive the app without a listener.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/v1/convert/tab-to-json", post(convert_tab_to_json))
        .route("/api/v1/convert/json-to-tab", post(convert_json_to_tab))
        .route("/api/v1/convert/tab-to-sra", post(convert_tab_to_sra))
        .route("/api/v1/convert/json-to-sra", post(convert_json_to_sra))
        .route("/api/v1/convert/tab-to-cedar", post(convert_tab_to_cedar))
        .route("/api/v1/validate/json", post(validate_json))
        .route("/api/v1/validate/tab", post(validate_tab))
        .route("/api/v1/import/external/{id}", get(import_external))
        .route("/api/v1/design/generate", post(design_generate))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server with external tool bindings from `config`.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        dispatcher: Arc::new(Dispatcher::new(
            Arena::new(&config.upload_dir),
            Arc::new(CliConverter::new(&config.converter_cmd)),
            Arc::new(CliValidator::new(&config.validator_cmd)),
        )),
        generator: Arc::new(CliGenerator::new(&config.generator_cmd)),
        importer: ExternalImporter::new(&config.import_base_url),
        limits: config.limits,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 isarest server running on http://localhost:{}", config.port);
    println!("   POST /api/v1/convert/*     - Format conversions");
    println!("   POST /api/v1/validate/*    - Document validation");
    println!("   POST /api/v1/design/generate - Study design generation");
    println!("   GET  /api/logs             - SSE log stream");
    println!("   GET  /health               - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "isarest",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Conversion handlers
// =============================================================================

fn payload_from(headers: &HeaderMap, body: Bytes) -> InputPayload {
    InputPayload::new(body.to_vec(), content_type(headers))
}

/// Declared content type with any parameters (charset etc.) stripped.
fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Conversions are blocking (filesystem + external tool), so they run on
/// the blocking pool.
async fn run_conversion(
    state: Arc<AppState>,
    source: Format,
    target: Format,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    let payload = payload_from(&headers, body);
    let dispatcher = state.dispatcher.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatcher.dispatch(source, target, payload))
        .await
        .map_err(|e| ServiceError::ResourceAllocation(e.to_string()))??;
    Ok(outcome_response(outcome))
}

async fn convert_tab_to_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    run_conversion(state, Format::Tab, Format::Json, headers, body).await
}

async fn convert_json_to_tab(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    run_conversion(state, Format::Json, Format::Tab, headers, body).await
}

async fn convert_tab_to_sra(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    run_conversion(state, Format::Tab, Format::Sra, headers, body).await
}

async fn convert_json_to_sra(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    run_conversion(state, Format::Json, Format::Sra, headers, body).await
}

async fn convert_tab_to_cedar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    run_conversion(state, Format::Tab, Format::Cedar, headers, body).await
}

// =============================================================================
// Validation handlers
// =============================================================================

async fn validate_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    let payload = payload_from(&headers, body);
    let dispatcher = state.dispatcher.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatcher.validate_json(payload))
        .await
        .map_err(|e| ServiceError::ResourceAllocation(e.to_string()))??;
    Ok(outcome_response(outcome))
}

async fn validate_tab(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    let payload = payload_from(&headers, body);
    let dispatcher = state.dispatcher.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatcher.validate_tab(payload))
        .await
        .map_err(|e| ServiceError::ResourceAllocation(e.to_string()))??;
    Ok(outcome_response(outcome))
}

// =============================================================================
// Import and design handlers
// =============================================================================

async fn import_external(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Response> {
    let bytes = state.importer.fetch_study(&id).await.map_err(|e| {
        log_error(format!("import {id}: {e}"));
        ServiceError::from(e)
    })?;
    Ok(outcome_response(Outcome::Archive { bytes }))
}

async fn design_generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Response> {
    let declared = content_type(&headers);
    if declared != MIME_JSON {
        return Err(ServiceError::UnsupportedMediaType {
            declared,
            accepted: MIME_JSON,
        });
    }

    let outcome = tokio::task::spawn_blocking(move || {
        run_design_request(
            state.dispatcher.arena(),
            &state.generator,
            &state.limits,
            &body,
        )
    })
    .await
    .map_err(|e| ServiceError::ResourceAllocation(e.to_string()))??;
    Ok(outcome_response(outcome))
}
