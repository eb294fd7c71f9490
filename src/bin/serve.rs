//! Thin HTTP front end over the Outbound Interface (C13), feature-gated
//! behind `serve` so the core can be embedded as a library without pulling
//! in axum. Read-only except for the backtest-request endpoint; all state
//! lives in the `Store`, there is no session/auth layer here because the
//! Outbound Interface itself has none (§6).

use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharpline_core::config::AppConfig;
use sharpline_core::domain::Recommendation;
use sharpline_core::error::CoreError;
use sharpline_core::outbound::{self, BacktestRequest, HealthReport, StrategySummary};
use sharpline_core::storage::Store;

#[derive(Clone)]
struct AppState {
    store: Store,
    config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    min_confidence: Option<f64>,
    window_minutes: Option<i64>,
}

/// Wraps a core error so the Outbound Interface's failures surface as a
/// non-2xx response instead of being swallowed into an empty-but-ok body.
struct AppError(CoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "outbound request failed");
        let status = match &self.0 {
            CoreError::Fatal(_) | CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        AppError(e)
    }
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthReport>, AppError> {
    let report = outbound::health(&state.store, &state.config, &[])?;
    Ok(Json(report))
}

async fn recommendations_handler(
    Query(params): Query<RecommendationQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Recommendation>>, AppError> {
    let recs = outbound::list_recommendations(&state.store, params.min_confidence, params.window_minutes)?;
    Ok(Json(recs))
}

async fn strategies_handler(State(state): State<AppState>) -> Result<Json<Vec<StrategySummary>>, AppError> {
    let summaries = outbound::list_strategies(&state.store)?;
    Ok(Json(summaries))
}

async fn backtest_handler(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Result<Json<Vec<sharpline_core::domain::BacktestResult>>, AppError> {
    let results = outbound::run_backtest(&state.store, &state.config, &request)?;
    Ok(Json(results))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sharpline_core=info,sharpline_serve=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config_path = env::var("SHARPLINE_CONFIG_PATH").unwrap_or_else(|_| "sharpline.toml".to_string());
    let config = AppConfig::load_from(&config_path).context("loading configuration")?;
    let store = Store::open(&config.database_path).context("opening store")?;

    let state = AppState {
        store,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/recommendations", get(recommendations_handler))
        .route("/api/strategies", get(strategies_handler))
        .route("/api/backtest/run", post(backtest_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = env::var("SHARPLINE_SERVE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr).await.context("binding listener")?;
    info!(addr, "sharpline-serve listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
