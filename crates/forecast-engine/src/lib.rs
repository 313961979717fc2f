pub mod arima;
pub mod trend;

pub use arima::{
    ArimaModel, ForecastInterval, PatternForecaster, PATTERN_CONFIDENCE, PATTERN_HORIZON,
    PATTERN_LOOKBACK, PATTERN_ORDER,
};
pub use trend::{TrendForecaster, TrendModel};
