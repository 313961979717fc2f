//! ARIMA(p, d, 0) fitting and forecasting.
//!
//! Estimation is conditional Gaussian maximum likelihood: after differencing
//! `d` times, the AR coefficients minimise the sum of squared one-step errors
//! over every observation with a full set of `p` lags. No constant term is
//! fitted. The innovation variance is the mean squared residual. Estimates
//! outside the stationary region are rejected rather than forecast.
//!
//! Forecast uncertainty is propagated with the psi-weights of
//! `phi(B) (1 - B)^d`, so the band widens with the horizon:
//! `se_h = sigma * sqrt(psi_0^2 + ... + psi_{h-1}^2)`.

use analysis_core::{AnalysisError, ArimaOrder, ForecastPoint, PatternForecast, PriceSeries};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

const MODEL: &str = "ARIMA";

pub const PATTERN_ORDER: ArimaOrder = ArimaOrder { p: 5, d: 1, q: 0 };
pub const PATTERN_LOOKBACK: usize = 500;
pub const PATTERN_HORIZON: usize = 30;
pub const PATTERN_CONFIDENCE: f64 = 0.95;

/// Fitted ARIMA model
#[derive(Debug, Clone)]
pub struct ArimaModel {
    pub order: ArimaOrder,
    pub ar_coeffs: Vec<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    /// Observations entering the likelihood (after differencing and lags)
    pub nobs: usize,
}

/// Point forecast with a symmetric confidence band per step
#[derive(Debug, Clone)]
pub struct ForecastInterval {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub confidence: f64,
}

impl ArimaModel {
    /// Smallest series length that leaves more equations than AR parameters.
    pub fn min_observations(order: ArimaOrder) -> usize {
        2 * order.p + order.d + 1
    }

    pub fn fit(data: &[f64], order: ArimaOrder) -> Result<Self, AnalysisError> {
        if order.q > 0 {
            return Err(AnalysisError::model_fit(
                MODEL,
                format!("{} has moving-average terms, which are not supported", order),
            ));
        }

        let required = Self::min_observations(order);
        if data.len() < required {
            return Err(AnalysisError::model_fit(
                MODEL,
                format!(
                    "{} needs at least {} observations, got {}",
                    order,
                    required,
                    data.len()
                ),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::model_fit(MODEL, "series contains non-finite values"));
        }

        let diff_data = difference(data, order.d);
        let (ar_coeffs, residuals) = estimate_ar(&diff_data, order.p)?;

        let n = residuals.len() as f64;
        let sigma2 = residuals.iter().map(|r| r * r).sum::<f64>() / n;
        if !sigma2.is_finite() || ar_coeffs.iter().any(|c| !c.is_finite()) {
            return Err(AnalysisError::model_fit(MODEL, "parameter estimates are not finite"));
        }
        if !is_stationary(&ar_coeffs) {
            return Err(AnalysisError::model_fit(
                MODEL,
                format!("AR coefficients {:?} are non-stationary", ar_coeffs),
            ));
        }
        if sigma2 <= 0.0 {
            return Err(AnalysisError::model_fit(
                MODEL,
                "residual variance is zero; the series is degenerate",
            ));
        }

        let log_likelihood = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = (order.p + 1) as f64;
        let aic = -2.0 * log_likelihood + 2.0 * k;

        Ok(Self {
            order,
            ar_coeffs,
            sigma2,
            log_likelihood,
            aic,
            nobs: residuals.len(),
        })
    }

    /// Point forecasts `steps` ahead, in the original (undifferenced) scale.
    pub fn forecast(&self, data: &[f64], steps: usize) -> Result<Vec<f64>, AnalysisError> {
        let d = self.order.d;
        let p = self.order.p;
        if data.len() < d + p.max(1) {
            return Err(AnalysisError::model_fit(
                MODEL,
                format!("cannot forecast from {} observations", data.len()),
            ));
        }

        // levels[k] is the series differenced k times
        let mut levels = vec![data.to_vec()];
        for k in 0..d {
            let next = difference(&levels[k], 1);
            levels.push(next);
        }

        let mut history = levels[d].clone();
        let mut forecasts = Vec::with_capacity(steps);
        for _ in 0..steps {
            let len = history.len();
            let value: f64 = self
                .ar_coeffs
                .iter()
                .enumerate()
                .map(|(i, phi)| phi * history[len - 1 - i])
                .sum();
            history.push(value);
            forecasts.push(value);
        }

        for level in levels[..d].iter().rev() {
            forecasts = integrate(&forecasts, level.last().copied().unwrap_or(0.0));
        }

        Ok(forecasts)
    }

    /// MA(infinity) weights of the integrated model, `psi_0 = 1`.
    pub fn psi_weights(&self, steps: usize) -> Vec<f64> {
        // Lag polynomial phi(B) (1 - B)^d with coefficient 1 at lag 0
        let mut poly: Vec<f64> = std::iter::once(1.0)
            .chain(self.ar_coeffs.iter().map(|c| -c))
            .collect();
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let lags: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

        let mut psi = Vec::with_capacity(steps);
        for j in 0..steps {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let value = (1..=j.min(lags.len()))
                .map(|i| lags[i - 1] * psi[j - i])
                .sum();
            psi.push(value);
        }
        psi
    }

    pub fn forecast_interval(
        &self,
        data: &[f64],
        steps: usize,
        confidence: f64,
    ) -> Result<ForecastInterval, AnalysisError> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(AnalysisError::InvalidData(format!(
                "confidence level must be in (0, 1), got {}",
                confidence
            )));
        }

        let point = self.forecast(data, steps)?;
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::model_fit(MODEL, e.to_string()))?;
        let z = normal.inverse_cdf(0.5 + confidence / 2.0);

        let mut lower = Vec::with_capacity(steps);
        let mut upper = Vec::with_capacity(steps);
        let mut cumulative = 0.0;
        for (psi, value) in self.psi_weights(steps).iter().zip(&point) {
            cumulative += psi * psi;
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(value - half_width);
            upper.push(value + half_width);
        }

        if point.iter().chain(&lower).chain(&upper).any(|v| !v.is_finite()) {
            return Err(AnalysisError::model_fit(MODEL, "forecast diverged to non-finite values"));
        }

        Ok(ForecastInterval {
            point,
            lower,
            upper,
            confidence,
        })
    }
}

/// Difference a series `d` times.
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return vec![];
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo one round of differencing, starting from the last observed level.
fn integrate(diff: &[f64], start: f64) -> Vec<f64> {
    let mut result = Vec::with_capacity(diff.len());
    let mut cumsum = start;
    for &d in diff {
        cumsum += d;
        result.push(cumsum);
    }
    result
}

/// Least squares AR(p) without intercept. Returns coefficients and residuals.
fn estimate_ar(data: &[f64], p: usize) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
    if p == 0 {
        return Ok((vec![], data.to_vec()));
    }

    let n = data.len();
    let rows = n.saturating_sub(p);
    if rows <= p {
        return Err(AnalysisError::model_fit(
            MODEL,
            format!("{} usable observations cannot identify {} AR terms", rows, p),
        ));
    }

    let x = DMatrix::from_fn(rows, p, |r, c| data[p + r - 1 - c]);
    let y = DVector::from_column_slice(&data[p..]);

    // Normal equations: (X'X) phi = X'y
    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y;
    let cholesky = xtx.cholesky().ok_or_else(|| {
        AnalysisError::model_fit(MODEL, "lag matrix is singular (is the price series constant?)")
    })?;
    let beta = cholesky.solve(&xty);

    let residuals: Vec<f64> = (&y - &x * &beta).iter().copied().collect();
    Ok((beta.iter().copied().collect(), residuals))
}

/// True when every root of `1 - phi_1 z - ... - phi_p z^p` lies outside the
/// unit circle, i.e. the companion matrix has spectral radius below one.
fn is_stationary(coeffs: &[f64]) -> bool {
    let p = coeffs.len();
    if p == 0 {
        return true;
    }

    let companion = DMatrix::from_fn(p, p, |r, c| {
        if r == 0 {
            coeffs[c]
        } else if r == c + 1 {
            1.0
        } else {
            0.0
        }
    });
    companion.complex_eigenvalues().iter().all(|root| root.norm() < 1.0)
}

/// The "pattern expert" guess: ARIMA on the trailing window, forecast with bands.
pub struct PatternForecaster {
    order: ArimaOrder,
    lookback: usize,
    horizon: usize,
    confidence: f64,
}

impl PatternForecaster {
    pub fn new() -> Self {
        Self {
            order: PATTERN_ORDER,
            lookback: PATTERN_LOOKBACK,
            horizon: PATTERN_HORIZON,
            confidence: PATTERN_CONFIDENCE,
        }
    }

    pub fn forecast(&self, series: &PriceSeries) -> Result<PatternForecast, AnalysisError> {
        let window = series.tail(self.lookback);
        let (first, last) = match (window.first(), window.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return Err(AnalysisError::model_fit(MODEL, "no observations to fit")),
        };

        let closes = window.closes();
        let model = ArimaModel::fit(&closes, self.order)?;
        let interval = model.forecast_interval(&closes, self.horizon, self.confidence)?;

        tracing::info!(
            "{} {}: {} closes, sigma2={:.4}, aic={:.2}",
            series.symbol,
            self.order,
            closes.len(),
            model.sigma2,
            model.aic
        );

        let step = series.interval.step();
        let points = (0..self.horizon)
            .map(|i| ForecastPoint {
                timestamp: last + step * (i as i32 + 1),
                value: interval.point[i],
                lower: Some(interval.lower[i]),
                upper: Some(interval.upper[i]),
            })
            .collect();

        Ok(PatternForecast {
            order: self.order,
            observations_used: closes.len(),
            history_start: first,
            ar_coefficients: model.ar_coeffs,
            sigma2: model.sigma2,
            log_likelihood: model.log_likelihood,
            aic: model.aic,
            confidence: interval.confidence,
            points,
        })
    }
}

impl Default for PatternForecaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Bar, Interval};
    use chrono::{Duration, TimeZone, Utc};

    /// Deterministic uniform noise in [-0.5, 0.5)
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        }
    }

    /// Price path whose daily changes follow d_t = phi * d_{t-1} + e_t
    fn ar1_price_path(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = Lcg(seed);
        let mut prices = vec![100.0];
        let mut change = 0.0;
        for _ in 1..n {
            change = phi * change + rng.next();
            let last = prices[prices.len() - 1];
            prices.push(last + change);
        }
        prices
    }

    fn daily_series(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 0.0,
            })
            .collect();
        PriceSeries::new("AAPL", Interval::Daily, bars).unwrap()
    }

    #[test]
    fn test_difference() {
        let data = vec![1.0, 3.0, 6.0, 10.0, 15.0];
        assert_eq!(difference(&data, 1), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(difference(&data, 2), vec![1.0, 1.0, 1.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let prices = ar1_price_path(600, 0.6, 7);
        let order = ArimaOrder { p: 1, d: 1, q: 0 };
        let model = ArimaModel::fit(&prices, order).unwrap();

        assert!((model.ar_coeffs[0] - 0.6).abs() < 0.15);
        // Uniform(-0.5, 0.5) has variance 1/12
        assert!((model.sigma2 - 1.0 / 12.0).abs() < 0.02);
        assert_eq!(model.nobs, 598);
    }

    #[test]
    fn test_random_walk_forecast_is_flat_with_sqrt_h_band() {
        let prices = ar1_price_path(200, 0.0, 11);
        let order = ArimaOrder { p: 0, d: 1, q: 0 };
        let model = ArimaModel::fit(&prices, order).unwrap();

        let interval = model.forecast_interval(&prices, 4, 0.95).unwrap();
        let last = prices[prices.len() - 1];
        for (h, value) in interval.point.iter().enumerate() {
            assert!((value - last).abs() < 1e-12);
            let half_width = interval.upper[h] - value;
            let expected = 1.959963984540054 * (model.sigma2 * (h + 1) as f64).sqrt();
            assert!((half_width - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_psi_weights_of_integrated_ar1() {
        // (1 - 0.5B)(1 - B) = 1 - 1.5B + 0.5B^2
        let model = ArimaModel {
            order: ArimaOrder { p: 1, d: 1, q: 0 },
            ar_coeffs: vec![0.5],
            sigma2: 1.0,
            log_likelihood: 0.0,
            aic: 0.0,
            nobs: 0,
        };
        let psi = model.psi_weights(4);
        let expected = [1.0, 1.5, 1.75, 1.875];
        for (a, b) in psi.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_forecast_integrates_from_last_level() {
        let model = ArimaModel {
            order: ArimaOrder { p: 1, d: 1, q: 0 },
            ar_coeffs: vec![0.5],
            sigma2: 1.0,
            log_likelihood: 0.0,
            aic: 0.0,
            nobs: 0,
        };
        // last change is +4, so the next changes are 2, 1, 0.5
        let forecast = model.forecast(&[10.0, 12.0, 16.0], 3).unwrap();
        assert_eq!(forecast, vec![18.0, 19.0, 19.5]);
    }

    #[test]
    fn test_pattern_forecast_shape() {
        let prices = ar1_price_path(700, 0.3, 42);
        let series = daily_series(&prices);
        let forecast = PatternForecaster::new().forecast(&series).unwrap();

        assert_eq!(forecast.points.len(), PATTERN_HORIZON);
        assert_eq!(forecast.observations_used, PATTERN_LOOKBACK);
        assert_eq!(forecast.order, PATTERN_ORDER);
        assert_eq!(forecast.ar_coefficients.len(), 5);
        assert_eq!(forecast.history_start, series.bars()[200].timestamp);

        let last = series.last().unwrap().timestamp;
        let mut previous = last;
        for (i, point) in forecast.points.iter().enumerate() {
            assert!(point.timestamp > previous);
            assert_eq!(point.timestamp, last + Duration::days(i as i64 + 1));
            previous = point.timestamp;

            let lower = point.lower.unwrap();
            let upper = point.upper.unwrap();
            assert!(lower <= point.value && point.value <= upper);
        }
    }

    #[test]
    fn test_band_widens_with_horizon() {
        let prices = ar1_price_path(300, 0.2, 5);
        let forecast = PatternForecaster::new().forecast(&daily_series(&prices)).unwrap();

        let widths: Vec<f64> = forecast
            .points
            .iter()
            .map(|p| p.upper.unwrap() - p.lower.unwrap())
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(forecast.observations_used, 300);
    }

    #[test]
    fn test_short_series_is_fit_failure() {
        let prices = ar1_price_path(11, 0.2, 3);
        let err = PatternForecaster::new()
            .forecast(&daily_series(&prices))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelFitFailure { .. }));
    }

    #[test]
    fn test_minimum_length_series_fits() {
        let order = ArimaOrder { p: 1, d: 1, q: 0 };
        assert_eq!(ArimaModel::min_observations(order), 4);

        // changes 2, 1, -0.5: phi = (2*1 + 1*-0.5) / (4 + 1)
        let model = ArimaModel::fit(&[100.0, 102.0, 103.0, 102.5], order).unwrap();
        assert!((model.ar_coeffs[0] - 0.3).abs() < 1e-12);
        assert_eq!(model.nobs, 2);

        assert!(ArimaModel::fit(&[100.0, 102.0, 103.0], order).is_err());
        assert_eq!(ArimaModel::min_observations(PATTERN_ORDER), 12);
    }

    #[test]
    fn test_stationarity_region() {
        assert!(is_stationary(&[]));
        assert!(is_stationary(&[0.6]));
        assert!(is_stationary(&[-0.9]));
        assert!(is_stationary(&[0.5, 0.3]));
        assert!(!is_stationary(&[1.0]));
        assert!(!is_stationary(&[1.3]));
        assert!(!is_stationary(&[0.5, 0.6]));
        // complex pair with modulus sqrt(1.2)
        assert!(!is_stationary(&[0.0, -1.2]));
    }

    #[test]
    fn test_explosive_changes_are_fit_failure() {
        let mut rng = Lcg(17);
        let mut prices = vec![100.0];
        let mut change = 0.5;
        for _ in 1..40 {
            change = 1.25 * change + 0.01 * rng.next();
            let last = prices[prices.len() - 1];
            prices.push(last + change);
        }

        let err = ArimaModel::fit(&prices, ArimaOrder { p: 1, d: 1, q: 0 }).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelFitFailure { .. }));
        assert!(err.to_string().contains("non-stationary"));
    }

    #[test]
    fn test_flat_series_is_fit_failure() {
        let prices = vec![50.0; 60];
        let err = PatternForecaster::new()
            .forecast(&daily_series(&prices))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelFitFailure { .. }));
    }

    #[test]
    fn test_empty_series_is_fit_failure() {
        let series = PriceSeries::empty("AAPL", Interval::Daily);
        assert!(PatternForecaster::new().forecast(&series).is_err());
    }

    #[test]
    fn test_moving_average_terms_rejected() {
        let prices = ar1_price_path(100, 0.2, 1);
        let err = ArimaModel::fit(&prices, ArimaOrder { p: 1, d: 1, q: 1 }).unwrap_err();
        assert!(err.to_string().contains("moving-average"));
    }
}
