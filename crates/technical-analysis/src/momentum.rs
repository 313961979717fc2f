use analysis_core::{AnalysisError, MomentumReading, PriceSeries, RsiStatus, SessionPoint};
use chrono::Duration;

use crate::indicators::*;

/// Computes the short-term RSI reading shown on the dashboard.
pub struct MomentumAnalyzer {
    window: usize,
    session_length: Duration,
}

impl MomentumAnalyzer {
    pub fn new() -> Self {
        Self {
            window: RSI_WINDOW,
            session_length: Duration::days(1),
        }
    }

    /// Latest RSI plus the most recent session's closes with aligned RSI.
    pub fn analyze(&self, series: &PriceSeries) -> Result<MomentumReading, AnalysisError> {
        if series.is_empty() {
            return Err(AnalysisError::IntradayUnavailable(series.symbol.clone()));
        }

        let points = rsi_series(series, self.window);
        let latest = latest_rsi(&points).ok_or_else(|| {
            AnalysisError::InsufficientData(format!(
                "Need at least {} bars for a {}-period RSI, got {}",
                self.window + 1,
                self.window,
                series.len()
            ))
        })?;
        // latest_rsi only returns points with a value
        let latest_value = latest.value.unwrap_or(FLAT_RSI);

        let start = session_start(series.bars(), self.session_length);
        let session = series.bars()[start..]
            .iter()
            .zip(&points[start..])
            .map(|(bar, point)| SessionPoint {
                timestamp: bar.timestamp,
                close: bar.close,
                rsi: point.value,
            })
            .collect();

        let status = RsiStatus::from_rsi(latest_value);
        tracing::debug!(
            "{} RSI({}) = {:.2} ({})",
            series.symbol,
            self.window,
            latest_value,
            status.to_label()
        );

        Ok(MomentumReading {
            window: self.window,
            latest_timestamp: latest.timestamp,
            latest_rsi: latest_value,
            status,
            session,
        })
    }
}

impl Default for MomentumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
