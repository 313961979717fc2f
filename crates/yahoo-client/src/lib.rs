use analysis_core::{AnalysisError, Bar, Interval, PriceRequest, PriceSeries, PriceSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Yahoo Finance v8 chart client
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Chart endpoint for `symbol`, which is percent-encoded as one path segment.
    fn chart_url(&self, symbol: &str) -> Result<Url, AnalysisError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            AnalysisError::FetchFailure(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                AnalysisError::FetchFailure(format!("base URL '{}' cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }

    /// Get historical price data between two instants (end exclusive)
    pub async fn get_historical_data(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<PriceSeries, AnalysisError> {
        let url = self.chart_url(symbol)?;
        tracing::debug!("GET {} [{} .. {}) interval={}", url, start, end, interval);

        let response = self
            .client
            .get(url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.code().to_string()),
                ("includePrePost", "false".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AnalysisError::FetchFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::FetchFailure(e.to_string()))?;

        // Yahoo answers unknown symbols with a 404 carrying a JSON error body
        let json: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            AnalysisError::FetchFailure(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ))
        })?;

        if !status.is_success() && status.as_u16() != 404 {
            return Err(AnalysisError::FetchFailure(format!(
                "HTTP {}: {}",
                status,
                chart_error_description(&json).unwrap_or_default()
            )));
        }

        let series = parse_chart(&json, symbol, interval)?;
        tracing::info!("Fetched {} {} bars for {}", series.len(), interval, symbol);
        Ok(series)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for YahooFinanceClient {
    async fn fetch(&self, request: &PriceRequest) -> Result<PriceSeries, AnalysisError> {
        self.get_historical_data(&request.symbol, request.start, request.end, request.interval)
            .await
    }
}

fn chart_error_description(json: &serde_json::Value) -> Option<String> {
    json.get("chart")
        .and_then(|v| v.get("error"))
        .filter(|v| !v.is_null())
        .map(|err| {
            let code = err.get("code").and_then(|v| v.as_str()).unwrap_or("unknown");
            let description = err.get("description").and_then(|v| v.as_str()).unwrap_or("");
            format!("{}: {}", code, description)
        })
}

/// Parse a chart payload into a series.
///
/// "Not Found" errors and results without timestamps yield an empty series.
/// Rows with any missing OHLCV field are skipped. Daily bars are stamped at
/// midnight UTC of their exchange-local trading date.
pub fn parse_chart(
    json: &serde_json::Value,
    symbol: &str,
    interval: Interval,
) -> Result<PriceSeries, AnalysisError> {
    let chart = json
        .get("chart")
        .ok_or_else(|| AnalysisError::FetchFailure("No chart object in response".to_string()))?;

    if let Some(err) = chart.get("error").filter(|v| !v.is_null()) {
        if err.get("code").and_then(|v| v.as_str()) == Some("Not Found") {
            return Ok(PriceSeries::empty(symbol, interval));
        }
        return Err(AnalysisError::FetchFailure(
            chart_error_description(json).unwrap_or_else(|| "chart error".to_string()),
        ));
    }

    let result = match chart
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
    {
        Some(result) => result,
        None => return Ok(PriceSeries::empty(symbol, interval)),
    };

    let timestamps = match result.get("timestamp").and_then(|v| v.as_array()) {
        Some(ts) => ts,
        None => return Ok(PriceSeries::empty(symbol, interval)),
    };

    let gmtoffset = result
        .get("meta")
        .and_then(|m| m.get("gmtoffset"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let quotes = result
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| AnalysisError::FetchFailure("No quote data found".to_string()))?;

    let opens = quote_column(quotes, "open")?;
    let highs = quote_column(quotes, "high")?;
    let lows = quote_column(quotes, "low")?;
    let closes = quote_column(quotes, "close")?;
    let volumes = quote_column(quotes, "volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        if let (Some(ts), Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            ts.as_i64(),
            value_at(opens, i),
            value_at(highs, i),
            value_at(lows, i),
            value_at(closes, i),
            value_at(volumes, i),
        ) {
            bars.push(Bar {
                timestamp: bar_timestamp(ts, gmtoffset, interval)?,
                open: o,
                high: h,
                low: l,
                close: c,
                volume: v,
            });
        }
    }

    bars.sort_by_key(|b| b.timestamp);
    // Yahoo repeats the live bar at the end of intraday responses; keep the latest copy
    bars.dedup_by(|later, earlier| {
        if later.timestamp == earlier.timestamp {
            std::mem::swap(later, earlier);
            true
        } else {
            false
        }
    });

    PriceSeries::new(symbol, interval, bars)
}

fn quote_column<'a>(
    quotes: &'a serde_json::Value,
    name: &str,
) -> Result<&'a [serde_json::Value], AnalysisError> {
    quotes
        .get(name)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .ok_or_else(|| AnalysisError::FetchFailure(format!("No {} prices", name)))
}

fn value_at(values: &[serde_json::Value], i: usize) -> Option<f64> {
    values.get(i).and_then(|v| v.as_f64())
}

fn bar_timestamp(ts: i64, gmtoffset: i64, interval: Interval) -> Result<DateTime<Utc>, AnalysisError> {
    let invalid = || AnalysisError::InvalidData(format!("Invalid timestamp {}", ts));
    match interval {
        Interval::OneMinute => DateTime::from_timestamp(ts, 0).ok_or_else(invalid),
        Interval::Daily => {
            let local = DateTime::from_timestamp(ts + gmtoffset, 0).ok_or_else(invalid)?;
            local
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .ok_or_else(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn daily_payload() -> serde_json::Value {
        // Three sessions from 2024-01-02 at 14:30 UTC (09:30 New York); the middle row is null
        json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "AAPL", "gmtoffset": -18000 },
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {
                        "quote": [{
                            "open":   [187.15, null, 184.22],
                            "high":   [188.44, null, 185.88],
                            "low":    [183.89, null, 183.43],
                            "close":  [185.64, null, 184.25],
                            "volume": [82488700, null, 58414500]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn test_parse_daily_skips_null_rows() {
        let series = parse_chart(&daily_payload(), "AAPL", Interval::Daily).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![185.64, 184.25]);
        assert_eq!(series.bars()[1].volume, 58414500.0);
    }

    #[test]
    fn test_parse_daily_normalizes_to_trading_date() {
        let series = parse_chart(&daily_payload(), "AAPL", Interval::Daily).unwrap();

        assert_eq!(
            series.first().unwrap().timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            series.last().unwrap().timestamp,
            Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_intraday_keeps_exact_times_and_drops_repeat() {
        let payload = json!({
            "chart": {
                "result": [{
                    "meta": { "gmtoffset": -18000 },
                    "timestamp": [1704205800, 1704205860, 1704205860],
                    "indicators": { "quote": [{
                        "open": [1.0, 2.0, 2.0],
                        "high": [1.0, 2.0, 2.5],
                        "low": [1.0, 2.0, 2.0],
                        "close": [1.0, 2.0, 2.4],
                        "volume": [10, 20, 25]
                    }]}
                }],
                "error": null
            }
        });

        let series = parse_chart(&payload, "AAPL", Interval::OneMinute).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![1.0, 2.4]);
        assert_eq!(
            series.first().unwrap().timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_not_found_is_empty_series() {
        let payload = json!({
            "chart": {
                "result": null,
                "error": {
                    "code": "Not Found",
                    "description": "No data found, symbol may be delisted"
                }
            }
        });

        let series = parse_chart(&payload, "ZZZZINVALID", Interval::Daily).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.symbol, "ZZZZINVALID");
    }

    #[test]
    fn test_result_without_timestamps_is_empty() {
        let payload = json!({
            "chart": {
                "result": [{ "meta": { "gmtoffset": 0 }, "indicators": { "quote": [{}] } }],
                "error": null
            }
        });

        assert!(parse_chart(&payload, "AAPL", Interval::Daily).unwrap().is_empty());
    }

    #[test]
    fn test_other_chart_errors_are_fetch_failures() {
        let payload = json!({
            "chart": {
                "result": null,
                "error": { "code": "Bad Request", "description": "Invalid input - interval=7m" }
            }
        });

        let err = parse_chart(&payload, "AAPL", Interval::OneMinute).unwrap_err();
        assert!(matches!(err, AnalysisError::FetchFailure(_)));
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = YahooFinanceClient::with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_chart_url_keeps_symbol_in_one_segment() {
        let client = YahooFinanceClient::with_base_url("http://localhost:9999/");

        let url = client.chart_url("BRK.B").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9999/v8/finance/chart/BRK.B");

        let url = client.chart_url("AAPL?interval=1wk&x=").unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.path(), "/v8/finance/chart/AAPL%3Finterval=1wk&x=");

        let url = client.chart_url("AAPL/../MSFT#x").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path_segments().unwrap().count(), 4);
    }

    #[test]
    fn test_chart_url_under_base_path() {
        let client = YahooFinanceClient::with_base_url("http://localhost:9999/proxy/");
        let url = client.chart_url("BTC-USD").unwrap();
        assert_eq!(url.path(), "/proxy/v8/finance/chart/BTC-USD");
    }

    #[test]
    fn test_invalid_base_url_is_fetch_failure() {
        let client = YahooFinanceClient::with_base_url("not a url");
        assert!(matches!(client.chart_url("AAPL"), Err(AnalysisError::FetchFailure(_))));
    }
}
