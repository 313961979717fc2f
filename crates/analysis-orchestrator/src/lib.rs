use analysis_core::{
    normalize_symbol, validate_symbol, AnalysisError, AnalysisReport, Interval, MomentumReading, PriceRequest,
    PriceSeries, PriceSource, RunOutcome, Stage, StageError,
};
use chrono::{DateTime, Utc};
use forecast_engine::{PatternForecaster, TrendForecaster};
use std::sync::Arc;
use technical_analysis::MomentumAnalyzer;

pub mod config;
pub use config::AnalysisConfig;

/// Runs one ticker through fetch, trend, pattern and momentum, in that order.
///
/// Only a failed or empty daily fetch stops the run. Every later stage records
/// its own failure in the report and the remaining stages still execute.
pub struct AnalysisOrchestrator {
    source: Arc<dyn PriceSource>,
    config: AnalysisConfig,
    trend: TrendForecaster,
    pattern: PatternForecaster,
    momentum: MomentumAnalyzer,
}

impl AnalysisOrchestrator {
    pub fn new(source: Arc<dyn PriceSource>, config: AnalysisConfig) -> Self {
        Self {
            source,
            config,
            trend: TrendForecaster::new(),
            pattern: PatternForecaster::new(),
            momentum: MomentumAnalyzer::new(),
        }
    }

    /// Perform a full analysis on a symbol as of now
    pub async fn analyze(&self, ticker: &str) -> AnalysisReport {
        self.analyze_at(ticker, Utc::now()).await
    }

    pub async fn analyze_at(&self, ticker: &str, now: DateTime<Utc>) -> AnalysisReport {
        let symbol = normalize_symbol(ticker);
        tracing::info!("Starting analysis for {:?}", symbol);

        let daily = match self.fetch_daily(&symbol, now).await {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!("Analysis for {:?} halted: {}", symbol, e);
                return AnalysisReport {
                    symbol,
                    generated_at: now,
                    outcome: RunOutcome::Halted {
                        error: StageError::from(e),
                    },
                };
            }
        };

        let trend = stage("trend", &symbol, self.trend.forecast(&daily));
        let pattern = stage("pattern", &symbol, self.pattern.forecast(&daily));
        let momentum = stage("momentum", &symbol, self.run_momentum(&symbol, now).await);

        tracing::info!("Finished analysis for {}", symbol);
        AnalysisReport {
            symbol,
            generated_at: now,
            outcome: RunOutcome::Completed {
                daily,
                trend,
                pattern,
                momentum,
            },
        }
    }

    async fn fetch_daily(&self, symbol: &str, now: DateTime<Utc>) -> Result<PriceSeries, AnalysisError> {
        let symbol = validate_symbol(symbol)?;
        let (start, end) = self.config.daily_window(now);
        let request = PriceRequest::new(&symbol, start, end, Interval::Daily);
        let series = self.source.fetch(&request).await?;
        if series.is_empty() {
            return Err(AnalysisError::EmptySeries(symbol));
        }

        tracing::info!("Loaded {} daily bars for {}", series.len(), symbol);
        Ok(series)
    }

    async fn run_momentum(&self, symbol: &str, now: DateTime<Utc>) -> Result<MomentumReading, AnalysisError> {
        let (start, end) = self.config.intraday_window(now);
        let request = PriceRequest::new(symbol, start, end, Interval::OneMinute);
        let intraday = self.source.fetch(&request).await?;
        tracing::info!("Loaded {} intraday bars for {}", intraday.len(), symbol);

        self.momentum.analyze(&intraday)
    }
}

fn stage<T>(name: &str, symbol: &str, result: Result<T, AnalysisError>) -> Stage<T> {
    if let Err(e) = &result {
        tracing::warn!("{} stage failed for {}: {}", name, symbol, e);
    }
    Stage::from(result)
}
