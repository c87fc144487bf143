//!
//! skiff update server
//! -------------------
//! Axum-based HTTP endpoint serving the artifact catalog under rotating-token
//! admission. The catalog is built once at startup from the `increment` and
//! `decrement` watch directories and shared read-only across all handlers;
//! files dropped in later are not picked up without a restart.
//!
//! Responsibilities:
//! - Catalog build at startup and immutable sharing via `Arc`.
//! - Token validation per request; 403 before any catalog byte is sent.
//! - Bounded handler concurrency: a counting semaphore gates handler bodies
//!   while the accept loop keeps pulling connections independently.
//! - Per-request panic containment mapped to 500; the listener survives.
//! - Access-log line for every request (any outcome) through the fan-out
//!   log sink: client IP, timestamp, raw path, status, user agent, protocol
//!   version, method.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures_util::FutureExt;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::catalog::{self, Catalog};
use crate::config::ServerConfig;
use crate::heartbeat;
use crate::logsink::{ConsoleSink, FileSink, LogSink, TeeSink};
use crate::token;

/// Largest request body the server reads (and discards) before answering.
const MAX_REQUEST_BODY_BYTES: usize = 4096;

/// Shared server state injected into all handlers.
///
/// The catalog is read-only for the process lifetime, so handlers share it
/// without synchronization. The semaphore bounds concurrently running
/// handlers; the in-flight counters exist so the bound is observable.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    salt: Arc<String>,
    tolerance_minutes: i64,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    access_log: Arc<dyn LogSink>,
}

impl AppState {
    /// Highest number of handlers observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Build the immutable catalog and the shared state from a config.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let catalog = catalog::build_server_catalog(
        &config.increment_dir(),
        &config.decrement_dir(),
        &config.artifact_extension,
    )?;
    info!(
        "catalog built: {} records ({} under {})",
        catalog.len(),
        config.artifact_extension,
        config.target_folder.display()
    );

    let access_log: Arc<dyn LogSink> = Arc::new(TeeSink::new(vec![
        Arc::new(ConsoleSink),
        Arc::new(FileSink::create(&config.access_log_path)?),
    ]));

    Ok(AppState {
        catalog: Arc::new(catalog),
        salt: Arc::new(config.salt.clone()),
        tolerance_minutes: token::DEFAULT_TOLERANCE_MINUTES,
        permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        in_flight: Arc::new(AtomicUsize::new(0)),
        peak_in_flight: Arc::new(AtomicUsize::new(0)),
        access_log,
    })
}

/// Mount all routes onto a router with the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(catalog_handler))
        .with_state(state)
}

/// Serve the app on an already-bound listener. Exposed separately so tests
/// can bind an ephemeral port.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Start the update server: build the catalog, spawn the heartbeat when
/// configured, bind the configured port and serve until the process exits.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;

    // Heartbeat runs independently of request handling; the cancel sender
    // lives as long as the server loop.
    let (_hb_cancel, hb_rx) = tokio::sync::watch::channel(false);
    if let Some(url) = config.heartbeat_url.clone() {
        tokio::spawn(heartbeat::run(url, hb_rx));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server started on port {}", config.port);
    info!("listening on {}", addr);
    serve(listener, state).await
}

#[derive(Deserialize)]
struct CatalogQuery {
    #[serde(rename = "authToken")]
    auth_token: Option<String>,
}

async fn catalog_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    version: Version,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<CatalogQuery>,
    body: Body,
) -> axum::response::Response {
    // Admission control gates handler execution only; axum's accept loop
    // keeps accepting while handlers wait here for a slot.
    let permit = match state.permits.clone().acquire_owned().await {
        Ok(p) => p,
        Err(_) => {
            let resp = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            log_request(&state, peer, &uri, StatusCode::INTERNAL_SERVER_ERROR, &headers, version, &method);
            return resp;
        }
    };

    let running = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak_in_flight.fetch_max(running, Ordering::SeqCst);

    let auth_token = query.auth_token;
    let outcome = AssertUnwindSafe(handle_catalog(&state, auth_token, body))
        .catch_unwind()
        .await;

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    drop(permit);

    let (status, response) = match outcome {
        Ok(Ok(catalog)) => {
            let resp = (StatusCode::OK, Json(catalog)).into_response();
            (StatusCode::OK, resp)
        }
        Ok(Err(status)) => (status, status.into_response()),
        Err(panic_payload) => {
            // Contain per-request panics; the listener keeps serving.
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", "catalog handler panic: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            )
        }
    };

    log_request(&state, peer, &uri, status, &headers, version, &method);
    response
}

/// Authenticate and serve the catalog. Returns the response status as the
/// error on any refusal so the caller owns logging.
async fn handle_catalog(
    state: &AppState,
    auth_token: Option<String>,
    body: Body,
) -> Result<Catalog, StatusCode> {
    // Read and discard any request body, bounded. Oversized or broken bodies
    // are ignored the same as empty ones.
    let _ = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await;

    let authorized = auth_token
        .map(|t| token::validate(&t, &state.salt, Utc::now(), state.tolerance_minutes))
        .unwrap_or(false);
    if !authorized {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok((*state.catalog).clone())
}

fn log_request(
    state: &AppState,
    peer: SocketAddr,
    uri: &Uri,
    status: StatusCode,
    headers: &HeaderMap,
    version: Version,
    method: &Method,
) {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    state.access_log.write_line(&format!(
        "{} -- [{}]: \"{}\" -- {} -- \"{}\" {:?} {}",
        peer.ip(),
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        uri,
        status.as_u16(),
        user_agent,
        version,
        method
    ));
}
