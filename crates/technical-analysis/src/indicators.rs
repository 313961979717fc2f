use analysis_core::{Bar, PriceSeries, RsiPoint};
use chrono::Duration;

/// Default RSI lookback
pub const RSI_WINDOW: usize = 14;

/// RSI reported when both average gain and average loss are zero (flat prices).
pub const FLAT_RSI: f64 = 50.0;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Relative Strength Index over simple (not Wilder-smoothed) averages.
///
/// The output has one entry per close. Entry `i` averages the gains and losses
/// of the `period` price changes ending at `i`, so the first `period` entries
/// are `None`.
pub fn rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut rsi_values = vec![None; data.len()];
    if period == 0 || data.len() < period + 1 {
        return rsi_values;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let avg_gains = sma(&gains, period);
    let avg_losses = sma(&losses, period);

    // avg_gains[k] covers changes k..k+period, i.e. closes up to index k + period.
    for (k, (avg_gain, avg_loss)) in avg_gains.iter().zip(avg_losses.iter()).enumerate() {
        rsi_values[k + period] = Some(rsi_from_averages(*avg_gain, *avg_loss));
    }

    rsi_values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { FLAT_RSI } else { 100.0 };
    }

    let rs = avg_gain / avg_loss;
    (100.0 - (100.0 / (1.0 + rs))).clamp(0.0, 100.0)
}

/// RSI aligned with the bars of a series.
pub fn rsi_series(series: &PriceSeries, period: usize) -> Vec<RsiPoint> {
    let values = rsi(&series.closes(), period);
    series
        .bars()
        .iter()
        .zip(values)
        .map(|(bar, value)| RsiPoint {
            timestamp: bar.timestamp,
            value,
        })
        .collect()
}

/// Most recent defined RSI point, if any.
pub fn latest_rsi(points: &[RsiPoint]) -> Option<RsiPoint> {
    points.iter().rev().find(|p| p.value.is_some()).copied()
}

/// Index of the first bar strictly after `last timestamp - lookback`.
///
/// With a one-day lookback this selects the most recent trading session of
/// an intraday series.
pub fn session_start(bars: &[Bar], lookback: Duration) -> usize {
    match bars.last() {
        Some(last) => {
            let cutoff = last.timestamp - lookback;
            bars.partition_point(|b| b.timestamp <= cutoff)
        }
        None => 0,
    }
}
