//! Server-side SVG charts for the dashboard.

use analysis_core::{AnalysisError, MomentumReading, PatternForecast, PriceSeries};
use chrono::{DateTime, Utc};
use plotters::prelude::*;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 480;

const PRICE_COLOR: RGBColor = RGBColor(31, 119, 180);
const FORECAST_COLOR: RGBColor = RGBColor(214, 39, 40);
const BAND_COLOR: RGBColor = RGBColor(255, 182, 193);
const OVERSOLD_COLOR: RGBColor = RGBColor(44, 160, 44);

fn chart_err<E: std::fmt::Display>(e: E) -> AnalysisError {
    AnalysisError::ChartError(e.to_string())
}

/// Padded min/max of a set of prices. Flat input still gets a non-empty range.
fn value_range(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;

    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.01 };
    Some((lo - pad, hi + pad))
}

/// Non-empty time axis; a single instant is widened by a minute each side.
fn time_range(first: DateTime<Utc>, last: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    if last > first {
        (first, last)
    } else {
        (first - chrono::Duration::minutes(1), last + chrono::Duration::minutes(1))
    }
}

/// Closing price over the full daily history
pub fn history_chart(series: &PriceSeries) -> Result<String, AnalysisError> {
    let bars = series.bars();
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => time_range(first.timestamp, last.timestamp),
        _ => return Err(AnalysisError::ChartError("no bars to plot".to_string())),
    };
    let (lo, hi) = value_range(bars.iter().map(|b| b.close))
        .ok_or_else(|| AnalysisError::ChartError("no finite closes".to_string()))?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} Historical Close Price", series.symbol), ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(36)
            .y_label_area_size(64)
            .build_cartesian_2d(first..last, lo..hi)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Price (USD)")
            .x_labels(8)
            .x_label_formatter(&|d| d.format("%Y-%m").to_string())
            .light_line_style(WHITE)
            .draw()
            .map_err(chart_err)?;

        chart
            .draw_series(LineSeries::new(
                bars.iter().map(|b| (b.timestamp, b.close)),
                PRICE_COLOR.stroke_width(1),
            ))
            .map_err(chart_err)?
            .label("Close Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], PRICE_COLOR));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }
    Ok(svg)
}

/// History window the model saw, the forecast path and its confidence band
pub fn forecast_chart(series: &PriceSeries, forecast: &PatternForecast) -> Result<String, AnalysisError> {
    let history = series.tail(forecast.observations_used);
    let (first, last_point) = match (history.first(), forecast.points.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return Err(AnalysisError::ChartError("nothing to plot".to_string())),
    };
    let (x0, x1) = time_range(first, last_point);

    let values = history
        .bars()
        .iter()
        .map(|b| b.close)
        .chain(forecast.points.iter().flat_map(|p| {
            [Some(p.value), p.lower, p.upper].into_iter().flatten()
        }));
    let (lo, hi) = value_range(values)
        .ok_or_else(|| AnalysisError::ChartError("no finite values".to_string()))?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!(
                    "ARIMA Forecast with {:.0}% Confidence Interval",
                    forecast.confidence * 100.0
                ),
                ("sans-serif", 22),
            )
            .margin(12)
            .x_label_area_size(36)
            .y_label_area_size(64)
            .build_cartesian_2d(x0..x1, lo..hi)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .y_desc("Price (USD)")
            .x_labels(8)
            .x_label_formatter(&|d| d.format("%Y-%m-%d").to_string())
            .light_line_style(WHITE)
            .draw()
            .map_err(chart_err)?;

        let band: Vec<(DateTime<Utc>, f64)> = forecast
            .points
            .iter()
            .filter_map(|p| p.upper.map(|u| (p.timestamp, u)))
            .chain(
                forecast
                    .points
                    .iter()
                    .rev()
                    .filter_map(|p| p.lower.map(|l| (p.timestamp, l))),
            )
            .collect();
        if !band.is_empty() {
            chart
                .draw_series(std::iter::once(Polygon::new(band, BAND_COLOR.mix(0.5).filled())))
                .map_err(chart_err)?
                .label("Confidence Interval")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 18, y + 5)], BAND_COLOR.filled()));
        }

        chart
            .draw_series(LineSeries::new(
                history.bars().iter().map(|b| (b.timestamp, b.close)),
                PRICE_COLOR.stroke_width(1),
            ))
            .map_err(chart_err)?
            .label(format!("Historical Price (Last {} days)", history.len()))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], PRICE_COLOR));

        chart
            .draw_series(LineSeries::new(
                forecast.points.iter().map(|p| (p.timestamp, p.value)),
                FORECAST_COLOR.stroke_width(2),
            ))
            .map_err(chart_err)?
            .label("Forecast")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], FORECAST_COLOR));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }
    Ok(svg)
}

/// Latest session's 1-minute closes on the left axis, RSI on the right with 70/30 guides
pub fn intraday_chart(symbol: &str, reading: &MomentumReading) -> Result<String, AnalysisError> {
    let session = &reading.session;
    let (first, last) = match (session.first(), session.last()) {
        (Some(first), Some(last)) => time_range(first.timestamp, last.timestamp),
        _ => return Err(AnalysisError::ChartError("empty intraday session".to_string())),
    };
    let (lo, hi) = value_range(session.iter().map(|p| p.close))
        .ok_or_else(|| AnalysisError::ChartError("no finite closes".to_string()))?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} Intraday Price and RSI", symbol), ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(36)
            .y_label_area_size(64)
            .right_y_label_area_size(48)
            .build_cartesian_2d(first..last, lo..hi)
            .map_err(chart_err)?
            .set_secondary_coord(first..last, 0f64..100f64);

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("Price (USD)")
            .x_labels(8)
            .x_label_formatter(&|d| d.format("%H:%M").to_string())
            .light_line_style(WHITE)
            .draw()
            .map_err(chart_err)?;

        chart
            .configure_secondary_axes()
            .y_desc("RSI")
            .draw()
            .map_err(chart_err)?;

        chart
            .draw_series(LineSeries::new(
                session.iter().map(|p| (p.timestamp, p.close)),
                PRICE_COLOR.stroke_width(1),
            ))
            .map_err(chart_err)?
            .label("Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], PRICE_COLOR));

        chart
            .draw_secondary_series(LineSeries::new(
                session.iter().filter_map(|p| p.rsi.map(|r| (p.timestamp, r))),
                FORECAST_COLOR.stroke_width(1),
            ))
            .map_err(chart_err)?
            .label("RSI")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], FORECAST_COLOR));

        for (level, color) in [(70.0, FORECAST_COLOR), (30.0, OVERSOLD_COLOR)] {
            chart
                .draw_secondary_series(LineSeries::new(
                    vec![(first, level), (last, level)],
                    color.mix(0.5).stroke_width(1),
                ))
                .map_err(chart_err)?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }
    Ok(svg)
}
