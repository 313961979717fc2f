use analysis_core::{AnalysisError, Direction, PriceSeries, TrendForecast};

const MODEL: &str = "Trend";

/// Ordinary least squares line through `(close[i], close[i + 1])` pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendModel {
    pub slope: f64,
    pub intercept: f64,
    pub samples: usize,
}

impl TrendModel {
    /// Fit `next = slope * today + intercept` over every consecutive pair of closes.
    ///
    /// When every `x` is identical the slope is undetermined; the minimum-norm
    /// solution (slope 0, intercept = mean of `y`) is used.
    pub fn fit(closes: &[f64]) -> Result<Self, AnalysisError> {
        let samples = closes.len().saturating_sub(1);
        if samples < 2 {
            return Err(AnalysisError::model_fit(
                MODEL,
                format!("need at least 2 paired samples, got {}", samples),
            ));
        }
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(AnalysisError::model_fit(MODEL, "close prices contain non-finite values"));
        }

        let xs = &closes[..samples];
        let ys = &closes[1..];
        let n = samples as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (y - mean_y);
        }

        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        let intercept = mean_y - slope * mean_x;

        Ok(Self {
            slope,
            intercept,
            samples,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// The "simple trend" guess: fit on the whole series, extrapolate one step from the last close.
pub struct TrendForecaster;

impl TrendForecaster {
    pub fn new() -> Self {
        Self
    }

    pub fn forecast(&self, series: &PriceSeries) -> Result<TrendForecast, AnalysisError> {
        let closes = series.closes();
        let model = TrendModel::fit(&closes)?;

        // fit() guarantees at least three closes
        let last_close = closes[closes.len() - 1];
        let predicted_close = model.predict(last_close);
        let direction = Direction::from_prediction(predicted_close, last_close);

        tracing::info!(
            "{} trend: next = {:.4} * close + {:.4} over {} pairs -> {:.2} ({})",
            series.symbol,
            model.slope,
            model.intercept,
            model.samples,
            predicted_close,
            direction.to_label()
        );

        Ok(TrendForecast {
            slope: model.slope,
            intercept: model.intercept,
            samples: model.samples,
            last_close,
            predicted_close,
            direction,
        })
    }
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self::new()
    }
}
