use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Sampling interval of a price series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1m")]
    OneMinute,
}

impl Interval {
    /// Interval code understood by the chart endpoint ("1d", "1m").
    pub fn code(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::OneMinute => "1m",
        }
    }

    /// Spacing between consecutive bars, used to lay out forecast timestamps.
    pub fn step(&self) -> Duration {
        match self {
            Interval::Daily => Duration::days(1),
            Interval::OneMinute => Duration::minutes(1),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A request for one ticker's history over `[start, end)` at one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRequest {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Interval,
}

impl PriceRequest {
    pub fn new(symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>, interval: Interval) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            start,
            end,
            interval,
        }
    }
}

/// Trim and uppercase a user-typed ticker.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Longest ticker accepted from user input.
pub const MAX_SYMBOL_LEN: usize = 16;

/// Normalize a user-typed ticker and reject anything that is not a plain
/// Yahoo symbol (`A-Z`, `0-9`, `.`, `^`, `=`, `-`).
pub fn validate_symbol(symbol: &str) -> Result<String, AnalysisError> {
    let symbol = normalize_symbol(symbol);
    if symbol.is_empty() {
        return Err(AnalysisError::InvalidData("ticker symbol is empty".to_string()));
    }
    if symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(AnalysisError::InvalidData(format!(
            "ticker symbol is longer than {} characters",
            MAX_SYMBOL_LEN
        )));
    }
    if let Some(bad) = symbol
        .chars()
        .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '^' | '=' | '-')))
    {
        return Err(AnalysisError::InvalidData(format!(
            "ticker symbol '{}' contains unsupported character '{}'",
            symbol, bad
        )));
    }
    Ok(symbol)
}

/// Ordered bars for one ticker at one interval. Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesFields")]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: Interval,
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct SeriesFields {
    symbol: String,
    interval: Interval,
    bars: Vec<Bar>,
}

impl TryFrom<SeriesFields> for PriceSeries {
    type Error = AnalysisError;

    fn try_from(fields: SeriesFields) -> Result<Self, Self::Error> {
        PriceSeries::new(&fields.symbol, fields.interval, fields.bars)
    }
}

impl PriceSeries {
    pub fn new(symbol: &str, interval: Interval, bars: Vec<Bar>) -> Result<Self, AnalysisError> {
        if let Some(pos) = bars.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(AnalysisError::InvalidData(format!(
                "{} {} series is not strictly increasing at index {} ({} after {})",
                symbol,
                interval,
                pos + 1,
                bars[pos + 1].timestamp,
                bars[pos].timestamp
            )));
        }

        Ok(Self {
            symbol: symbol.to_string(),
            interval,
            bars,
        })
    }

    pub fn empty(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            bars: Vec::new(),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// The trailing `n` bars (or all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.bars.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            interval: self.interval,
            bars: self.bars[start..].to_vec(),
        }
    }
}

/// RSI value aligned with one input bar; `None` during warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// One forecast step. Bounds are only present for interval forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// UP only when the prediction strictly exceeds the last close.
    pub fn from_prediction(predicted: f64, last_close: f64) -> Self {
        if predicted > last_close {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

/// Result of the one-step linear "next close" regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub slope: f64,
    pub intercept: f64,
    pub samples: usize,
    pub last_close: f64,
    pub predicted_close: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Multi-step ARIMA forecast with a confidence band per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternForecast {
    pub order: ArimaOrder,
    pub observations_used: usize,
    pub history_start: DateTime<Utc>,
    pub ar_coefficients: Vec<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub confidence: f64,
    pub points: Vec<ForecastPoint>,
}

/// Momentum status derived from an RSI reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiStatus {
    Overbought,
    Oversold,
    Neutral,
}

impl RsiStatus {
    pub const OVERBOUGHT_ABOVE: f64 = 70.0;
    pub const OVERSOLD_BELOW: f64 = 30.0;

    pub fn from_rsi(value: f64) -> Self {
        if value > Self::OVERBOUGHT_ABOVE {
            RsiStatus::Overbought
        } else if value < Self::OVERSOLD_BELOW {
            RsiStatus::Oversold
        } else {
            RsiStatus::Neutral
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            RsiStatus::Overbought => "Overbought",
            RsiStatus::Oversold => "Oversold",
            RsiStatus::Neutral => "Neutral",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            RsiStatus::Overbought => {
                "The RSI suggests the price has risen quickly and may be due for a pullback (a drop)."
            }
            RsiStatus::Oversold => {
                "The RSI suggests the price has fallen quickly and may be due for a bounce (a rise)."
            }
            RsiStatus::Neutral => {
                "The RSI is between 30 and 70, indicating no strong short-term momentum in either direction."
            }
        }
    }
}

/// Intraday bar with its aligned RSI, as plotted on the session chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionPoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumReading {
    pub window: usize,
    pub latest_timestamp: DateTime<Utc>,
    pub latest_rsi: f64,
    pub status: RsiStatus,
    pub session: Vec<SessionPoint>,
}

/// Error as it appears in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

impl From<&AnalysisError> for StageError {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<AnalysisError> for StageError {
    fn from(err: AnalysisError) -> Self {
        StageError::from(&err)
    }
}

/// Outcome of one independent stage of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Stage<T> {
    Ok(T),
    Failed(StageError),
}

impl<T> Stage<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            Stage::Ok(value) => Some(value),
            Stage::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            Stage::Ok(_) => None,
            Stage::Failed(err) => Some(err),
        }
    }
}

impl<T> From<Result<T, AnalysisError>> for Stage<T> {
    fn from(result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(value) => Stage::Ok(value),
            Err(err) => Stage::Failed(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The daily fetch failed or came back empty; nothing else ran.
    Halted { error: StageError },
    Completed {
        daily: PriceSeries,
        trend: Stage<TrendForecast>,
        pattern: Stage<PatternForecast>,
        momentum: Stage<MomentumReading>,
    },
}

/// Everything one analysis run produced for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

impl AnalysisReport {
    pub fn is_halted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Halted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_series_rejects_unordered_bars() {
        let bars = vec![bar_at(2, 10.0), bar_at(1, 11.0)];
        let result = PriceSeries::new("AAPL", Interval::Daily, bars);
        assert!(matches!(result, Err(AnalysisError::InvalidData(_))));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamps() {
        let bars = vec![bar_at(1, 10.0), bar_at(1, 11.0)];
        assert!(PriceSeries::new("AAPL", Interval::Daily, bars).is_err());
    }

    #[test]
    fn test_tail_shorter_than_series() {
        let bars = (1..=10).map(|d| bar_at(d, d as f64)).collect();
        let series = PriceSeries::new("AAPL", Interval::Daily, bars).unwrap();

        let tail = series.tail(3);
        assert_eq!(tail.closes(), vec![8.0, 9.0, 10.0]);
        assert_eq!(series.tail(500).len(), 10);
    }

    #[test]
    fn test_direction_ties_resolve_down() {
        assert_eq!(Direction::from_prediction(101.0, 100.0), Direction::Up);
        assert_eq!(Direction::from_prediction(100.0, 100.0), Direction::Down);
        assert_eq!(Direction::from_prediction(99.0, 100.0), Direction::Down);
    }

    #[test]
    fn test_rsi_status_thresholds() {
        assert_eq!(RsiStatus::from_rsi(70.1), RsiStatus::Overbought);
        assert_eq!(RsiStatus::from_rsi(70.0), RsiStatus::Neutral);
        assert_eq!(RsiStatus::from_rsi(30.0), RsiStatus::Neutral);
        assert_eq!(RsiStatus::from_rsi(29.9), RsiStatus::Oversold);
    }

    #[test]
    fn test_request_normalizes_symbol() {
        let now = Utc::now();
        let req = PriceRequest::new(" aapl ", now, now, Interval::Daily);
        assert_eq!(req.symbol, "AAPL");
    }

    #[test]
    fn test_stage_serializes_with_status_tag() {
        let stage: Stage<TrendForecast> =
            Err(AnalysisError::model_fit("Trend", "need at least 2 paired samples")).into();
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "model_fit_failure");
    }

    #[test]
    fn test_interval_codes() {
        assert_eq!(Interval::Daily.code(), "1d");
        assert_eq!(Interval::OneMinute.code(), "1m");
        assert_eq!(Interval::Daily.step(), Duration::days(1));
    }

    #[test]
    fn test_validate_symbol_accepts_yahoo_tickers() {
        assert_eq!(validate_symbol(" brk.b ").unwrap(), "BRK.B");
        assert_eq!(validate_symbol("^gspc").unwrap(), "^GSPC");
        assert_eq!(validate_symbol("eurusd=x").unwrap(), "EURUSD=X");
        assert_eq!(validate_symbol("BTC-USD").unwrap(), "BTC-USD");
    }

    #[test]
    fn test_validate_symbol_rejects_url_characters() {
        for symbol in ["AAPL?interval=1wk&x=", "AAPL/../MSFT", "AAPL#frag", "AA PL", "AAPL%3F"] {
            let err = validate_symbol(symbol).unwrap_err();
            assert_eq!(err.kind(), "invalid_data", "{}", symbol);
        }
        assert!(validate_symbol("   ").is_err());
        assert!(validate_symbol(&"A".repeat(MAX_SYMBOL_LEN + 1)).is_err());
    }

    #[test]
    fn test_deserialize_rejects_unordered_series() {
        let series = PriceSeries::new("AAPL", Interval::Daily, vec![bar_at(1, 10.0), bar_at(2, 11.0)]).unwrap();
        let mut json = serde_json::to_value(&series).unwrap();
        let back: PriceSeries = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, series);

        json["bars"].as_array_mut().unwrap().reverse();
        assert!(serde_json::from_value::<PriceSeries>(json).is_err());
    }
}
