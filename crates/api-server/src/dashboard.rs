//! HTML dashboard: ticker form in the sidebar, one analysis run rendered per request.

use analysis_core::{
    normalize_symbol, AnalysisError, AnalysisReport, Direction, MomentumReading,
    PatternForecast, PriceSeries, RsiStatus, RunOutcome, Stage, StageError, TrendForecast,
};
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::fmt::Write;

use crate::{charts, AppError, AppState};

pub const DEFAULT_TICKER: &str = "AAPL";

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub ticker: Option<String>,
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}

async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Html<String>, AppError> {
    let ticker = query
        .ticker
        .map(|t| normalize_symbol(&t))
        .filter(|t| !t.is_empty());

    let report = match &ticker {
        Some(symbol) => Some(state.orchestrator.analyze(symbol).await),
        None => None,
    };
    let input = ticker.unwrap_or_else(|| DEFAULT_TICKER.to_string());

    // SVG rendering is CPU-bound
    let page = tokio::task::spawn_blocking(move || render_page(&input, report.as_ref()))
        .await
        .map_err(|e| anyhow::anyhow!("Page render failed: {}", e))?;

    Ok(Html(page))
}

/// Full page for the given form value and (optional) finished run
pub fn render_page(ticker_input: &str, report: Option<&AnalysisReport>) -> String {
    let main = match report {
        Some(report) => render_report(report),
        None => info_panel("Enter a stock ticker on the left and click 'Run Analysis' to begin."),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Stock Market Predictor</title>
<style>
body {{ margin: 0; font-family: sans-serif; display: flex; color: #262730; }}
aside {{ width: 260px; min-height: 100vh; padding: 24px; background: #f0f2f6; box-sizing: border-box; }}
main {{ flex: 1; padding: 24px 48px; max-width: 1100px; }}
input[type=text] {{ width: 100%; padding: 6px; margin: 8px 0 12px; box-sizing: border-box; }}
button {{ padding: 6px 14px; }}
.panel {{ padding: 12px 16px; border-radius: 6px; margin: 12px 0; }}
.info {{ background: #e8f0fe; }} .success {{ background: #e6f4ea; }}
.warning {{ background: #fef7e0; }} .error {{ background: #fce8e6; }}
.chart svg {{ max-width: 100%; height: auto; }}
</style>
</head>
<body>
<aside>
<h2>User Input</h2>
<form method="get" action="/">
<label for="ticker">Enter Stock Ticker (e.g., AAPL, GOOGL)</label>
<input type="text" id="ticker" name="ticker" value="{ticker}">
<button type="submit">Run Analysis</button>
</form>
</aside>
<main>
<h1>📈 Simple Stock Market Predictor</h1>
<p>This app uses historical data to make a simple prediction about a stock's closing price for the next day.
<strong>Disclaimer:</strong> This is an educational tool and not financial advice.</p>
{disclaimer}
{main}
</main>
</body>
</html>
"#,
        ticker = escape_html(ticker_input),
        disclaimer = info_panel(
            "💡 <strong>Important:</strong> This app predicts the <strong>closing price for the next day</strong>, \
             not price movements within the next few minutes. Short-term trading is much more complex!"
        ),
        main = main,
    )
}

fn render_report(report: &AnalysisReport) -> String {
    let mut html = format!("<h2>Analysis for {}</h2>\n", escape_html(&report.symbol));

    let (daily, trend, pattern, momentum) = match &report.outcome {
        RunOutcome::Halted { error } => {
            html.push_str(&error_panel(&halt_message(error)));
            return html;
        }
        RunOutcome::Completed {
            daily,
            trend,
            pattern,
            momentum,
        } => (daily, trend, pattern, momentum),
    };

    html.push_str(&history_section(daily));
    html.push_str(&trend_section(trend));
    html.push_str(&pattern_section(daily, pattern));
    html.push_str(&momentum_section(&report.symbol, momentum));
    html
}

fn halt_message(error: &StageError) -> String {
    if error.kind == "empty_series" {
        escape_html(&error.message)
    } else {
        format!("Error fetching data: {}", escape_html(&error.message))
    }
}

fn history_section(daily: &PriceSeries) -> String {
    let mut html = String::from(
        "<h3>Looking at the Past</h3>\n<p>This chart shows the stock's historical closing price. \
         This helps us see the overall trend.</p>\n",
    );
    html.push_str(&chart_or_error(charts::history_chart(daily)));
    html
}

fn trend_section(trend: &Stage<TrendForecast>) -> String {
    let mut html = String::from(
        "<h2>Prediction 1: The 'Simple Trend' Guess</h2>\n<p>This first prediction is like drawing a \
         straight line through the recent price points to guess the next one. It's a simple, baseline \
         prediction.</p>\n",
    );

    match trend {
        Stage::Ok(forecast) => {
            html.push_str("<h3>So, will the price go up or down?</h3>\n");
            html.push_str(&verdict_panel(forecast));
        }
        Stage::Failed(err) => html.push_str(&error_panel(&escape_html(&err.message))),
    }
    html
}

pub fn verdict_panel(forecast: &TrendForecast) -> String {
    match forecast.direction {
        Direction::Up => panel(
            "success",
            &format!(
                "🔼 <strong>UP</strong>: The model predicts the price will rise from ${:.2} to <strong>${:.2}</strong>.",
                forecast.last_close, forecast.predicted_close
            ),
        ),
        Direction::Down => panel(
            "warning",
            &format!(
                "🔽 <strong>DOWN</strong>: The model predicts the price will fall from ${:.2} to <strong>${:.2}</strong>.",
                forecast.last_close, forecast.predicted_close
            ),
        ),
    }
}

fn pattern_section(daily: &PriceSeries, pattern: &Stage<PatternForecast>) -> String {
    let mut html = String::from(
        "<h2>Prediction 2: The 'Pattern Expert' Guess</h2>\n<p>This second model, ARIMA, is more \
         sophisticated. It's an expert at finding repeating patterns, trends, and 'memory' in the price \
         history to forecast the future.</p>\n",
    );

    match pattern {
        Stage::Ok(forecast) => {
            let _ = writeln!(html, "<h3>{}-Day Forecast</h3>", forecast.points.len());
            html.push_str(&chart_or_error(charts::forecast_chart(daily, forecast)));
            let _ = write!(
                html,
                "<ul>\n<li>The <strong>red line</strong> is the model's forecast.</li>\n\
                 <li>The <strong>pink area</strong> is the 'Confidence Interval'. It shows the range of \
                 uncertainty. The model is {:.0}% confident the actual price will stay within this pink zone. \
                 Notice how it gets wider? That's because it's harder to be certain about predictions far \
                 in the future.</li>\n</ul>\n",
                forecast.confidence * 100.0
            );
        }
        Stage::Failed(err) => html.push_str(&error_panel(&escape_html(&err.message))),
    }
    html
}

fn momentum_section(symbol: &str, momentum: &Stage<MomentumReading>) -> String {
    let mut html = String::from(
        "<h2>Short-Term Momentum (Educational Demo)</h2>\n<p>This section analyzes the last few days of \
         minute-by-minute data to check for short-term momentum using the Relative Strength Index (RSI). \
         This is <strong>not a prediction</strong>, but a common technical indicator.</p>\n",
    );

    match momentum {
        Stage::Ok(reading) => {
            let _ = writeln!(html, "<h3>Current 1-Minute RSI: {:.2}</h3>", reading.latest_rsi);
            let class = match reading.status {
                RsiStatus::Overbought => "warning",
                RsiStatus::Oversold => "success",
                RsiStatus::Neutral => "info",
            };
            html.push_str(&panel(
                class,
                &format!(
                    "Status: <strong>{}</strong>. {}",
                    reading.status.to_label(),
                    reading.status.explanation()
                ),
            ));
            html.push_str("<p>The charts below show the price and RSI for the most recent trading day.</p>\n");
            html.push_str(&chart_or_error(charts::intraday_chart(symbol, reading)));
        }
        Stage::Failed(err) if err.kind == "intraday_unavailable" => {
            html.push_str(&panel("warning", "Could not retrieve intraday data for this ticker."));
        }
        Stage::Failed(err) => html.push_str(&error_panel(&format!(
            "Could not perform intraday analysis. Error: {}",
            escape_html(&err.message)
        ))),
    }
    html
}

fn chart_or_error(chart: Result<String, AnalysisError>) -> String {
    match chart {
        Ok(svg) => format!("<div class=\"chart\">{}</div>\n", svg),
        Err(e) => {
            tracing::warn!("Chart rendering failed: {}", e);
            error_panel(&escape_html(&e.to_string()))
        }
    }
}

fn panel(class: &str, body: &str) -> String {
    format!("<div class=\"panel {}\">{}</div>\n", class, body)
}

fn info_panel(body: &str) -> String {
    panel("info", body)
}

fn error_panel(body: &str) -> String {
    panel("error", body)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app, body_text};
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn get_page(uri: &str) -> String {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_verdict_text() {
        let up = TrendForecast {
            slope: 1.0,
            intercept: 0.5,
            samples: 10,
            last_close: 100.0,
            predicted_close: 100.5,
            direction: Direction::Up,
        };
        assert!(verdict_panel(&up)
            .contains("🔼 <strong>UP</strong>: The model predicts the price will rise from $100.00 to <strong>$100.50</strong>."));

        let down = TrendForecast {
            predicted_close: 100.0,
            direction: Direction::Down,
            ..up
        };
        assert!(verdict_panel(&down).contains("will fall from $100.00 to <strong>$100.00</strong>"));
    }

    #[test]
    fn test_landing_page_prompts_for_ticker() {
        let page = render_page(DEFAULT_TICKER, None);
        assert!(page.contains("value=\"AAPL\""));
        assert!(page.contains("Run Analysis"));
        assert!(page.contains("Enter a stock ticker on the left and click 'Run Analysis' to begin."));
        assert!(page.contains("closing price for the next day"));
    }

    #[tokio::test]
    async fn test_dashboard_without_ticker() {
        let page = get_page("/").await;
        assert!(page.contains("Enter a stock ticker on the left"));
        assert!(!page.contains("<svg"));
    }

    #[tokio::test]
    async fn test_dashboard_renders_every_section() {
        let page = get_page("/?ticker=aapl").await;

        assert!(page.contains("Analysis for AAPL"));
        assert!(page.contains("value=\"AAPL\""));
        assert!(page.contains("AAPL Historical Close Price"));
        assert!(page.contains("So, will the price go up or down?"));
        assert!(page.contains("30-Day Forecast"));
        assert!(page.contains("Current 1-Minute RSI:"));
        assert!(page.contains("AAPL Intraday Price and RSI"));
    }

    #[tokio::test]
    async fn test_dashboard_unknown_ticker_shows_error_only() {
        let page = get_page("/?ticker=zzzzinvalid").await;

        assert!(page.contains("No data found for ZZZZINVALID. Please check the ticker symbol."));
        assert!(!page.contains("<svg"));
        assert!(!page.contains("Prediction 1"));
    }

    #[tokio::test]
    async fn test_dashboard_rejects_ticker_with_path_characters() {
        let page = get_page("/?ticker=aapl%2F..%2Fmsft").await;

        assert!(page.contains("Error fetching data: Invalid data:"));
        assert!(page.contains("unsupported character"));
        assert!(!page.contains("<svg"));
    }
}
