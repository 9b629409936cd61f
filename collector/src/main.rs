use anyhow::Context;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use harness::LatencyReport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod store;
mod types;
mod websocket;

use store::ReportStore;
use types::*;

const DEFAULT_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let addr = std::env::var("COLLECTOR_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let app = router(AppState::new(ReportStore::default()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("latency collector listening on http://{}", addr);
    info!("  GET  /health");
    info!("  POST /reports");
    info!("  GET  /reports?broker=&limit=");
    info!("  GET  /brokers");
    info!("  GET  /brokers/:broker/summary");
    info!("  WS   /reports/stream?broker=");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    store: Arc<ReportStore>,
    report_tx: broadcast::Sender<StoredReport>,
}

impl AppState {
    fn new(store: ReportStore) -> Self {
        let (report_tx, _) = broadcast::channel(1000);
        Self {
            store: Arc::new(store),
            report_tx,
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/reports", get(list_reports).post(submit_report))
        .route("/reports/stream", get(report_stream))
        .route("/brokers", get(list_brokers))
        .route("/brokers/:broker/summary", get(broker_summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "orderlat-collector",
        "version": env!("CARGO_PKG_VERSION"),
        "reports": state.store.len().await,
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

async fn submit_report(
    State(state): State<AppState>,
    Json(report): Json<LatencyReport>,
) -> Result<impl IntoResponse, AppError> {
    if report.broker.trim().is_empty() {
        return Err(AppError::InvalidReport("broker must not be empty"));
    }
    if report.symbol.trim().is_empty() {
        return Err(AppError::InvalidReport("symbol must not be empty"));
    }

    let stored = state.store.insert(report).await;
    debug!(
        id = %stored.id,
        broker = %stored.report.broker,
        outcome = %stored.report.outcome,
        "report accepted"
    );
    let _ = state.report_tx.send(stored.clone());

    Ok((StatusCode::CREATED, Json(ReportAccepted { id: stored.id })))
}

async fn list_reports(
    Query(params): Query<ReportsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Json(state.store.recent(params.broker.as_deref(), limit).await)
}

async fn list_brokers(State(state): State<AppState>) -> impl IntoResponse {
    Json(BrokersResponse {
        brokers: state.store.brokers(),
    })
}

async fn broker_summary(
    Path(broker): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.store.summary(&broker).await.ok_or(AppError::BrokerNotFound)?;
    Ok(Json(summary))
}

async fn report_stream(
    Query(params): Query<StreamQuery>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| websocket::handle_report_stream(socket, params.broker, state))
}

#[derive(Debug)]
enum AppError {
    BrokerNotFound,
    InvalidReport(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BrokerNotFound => (StatusCode::NOT_FOUND, "Broker not found"),
            AppError::InvalidReport(reason) => (StatusCode::BAD_REQUEST, reason),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
