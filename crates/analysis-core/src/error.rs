use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Fetch failure: {0}")]
    FetchFailure(String),

    #[error("No data found for {0}. Please check the ticker symbol.")]
    EmptySeries(String),

    #[error("{model} model failed: {reason}")]
    ModelFitFailure { model: String, reason: String },

    #[error("Could not retrieve intraday data for {0}")]
    IntradayUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Chart error: {0}")]
    ChartError(String),
}

impl AnalysisError {
    pub fn model_fit(model: &str, reason: impl Into<String>) -> Self {
        AnalysisError::ModelFitFailure {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag, used in reports and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::FetchFailure(_) => "fetch_failure",
            AnalysisError::EmptySeries(_) => "empty_series",
            AnalysisError::ModelFitFailure { .. } => "model_fit_failure",
            AnalysisError::IntradayUnavailable(_) => "intraday_unavailable",
            AnalysisError::InsufficientData(_) => "insufficient_data",
            AnalysisError::InvalidData(_) => "invalid_data",
            AnalysisError::DatabaseError(_) => "database_error",
            AnalysisError::ChartError(_) => "chart_error",
        }
    }
}
