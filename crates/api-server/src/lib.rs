use analysis_orchestrator::{AnalysisConfig, AnalysisOrchestrator};
use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use yahoo_client::YahooFinanceClient;

pub mod analysis_routes;
pub mod charts;
pub mod dashboard;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error: an `anyhow` error plus the status it should be reported with.
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        }
        let body = ApiResponse::<()>::error(format!("{:#}", self.error));
        (self.status, Json(body)).into_response()
    }
}

/// Listener and upstream settings for the HTTP server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub yahoo_base_url: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("API_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match std::env::var("API_PORT") {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("API_PORT must be a port number, got '{}'", value))?,
            Err(_) => DEFAULT_PORT,
        };
        let yahoo_base_url = std::env::var("YAHOO_BASE_URL")
            .unwrap_or_else(|_| yahoo_client::DEFAULT_BASE_URL.to_string());

        Ok(Self {
            host,
            port,
            yahoo_base_url,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(dashboard::dashboard_routes())
        .merge(analysis_routes::analysis_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api_server=info,analysis_orchestrator=info,forecast_engine=info,yahoo_client=warn,tower_http=info"
                    .into()
            }),
        )
        .init();

    let server_config = ServerConfig::from_env()?;
    let analysis_config = AnalysisConfig::from_env()?;
    tracing::info!(
        "History window starts {} (end: {}), intraday lookback {} days",
        analysis_config.history_start,
        analysis_config
            .history_end
            .map(|d| d.to_string())
            .unwrap_or_else(|| "today".to_string()),
        analysis_config.intraday_lookback_days
    );

    let source = Arc::new(YahooFinanceClient::with_base_url(&server_config.yahoo_base_url));
    let state = AppState {
        orchestrator: Arc::new(AnalysisOrchestrator::new(source, analysis_config)),
    };

    let app = build_router(state);
    let addr = server_config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("🚀 Dashboard listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use analysis_core::{AnalysisError, Bar, Interval, PriceRequest, PriceSeries, PriceSource};
    use async_trait::async_trait;

    /// Serves the same seeded random walk for every symbol except ZZZZINVALID,
    /// which is empty.
    pub struct FixtureSource;

    fn walk(n: i32) -> Vec<f64> {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut close = 100.0;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                close += 0.1 + (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
                close
            })
            .collect()
    }

    #[async_trait]
    impl PriceSource for FixtureSource {
        async fn fetch(&self, request: &PriceRequest) -> Result<PriceSeries, AnalysisError> {
            if request.symbol == "ZZZZINVALID" {
                return Ok(PriceSeries::empty(&request.symbol, request.interval));
            }

            let n = match request.interval {
                Interval::Daily => 120,
                Interval::OneMinute => 90,
            };
            let step = request.interval.step();
            let start = request.end - step * n;
            let bars = walk(n)
                .into_iter()
                .zip(0..)
                .map(|(close, i)| Bar {
                    timestamp: start + step * i,
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1000.0,
                })
                .collect();
            PriceSeries::new(&request.symbol, request.interval, bars)
        }
    }

    pub fn app() -> Router {
        let orchestrator = AnalysisOrchestrator::new(Arc::new(FixtureSource), AnalysisConfig::default());
        build_router(AppState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
