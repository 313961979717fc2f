use async_trait::async_trait;
use crate::{AnalysisError, PriceRequest, PriceSeries};

/// Anything that can answer a price-history request.
///
/// An unknown ticker or an empty date range is not an error: implementations
/// return an empty series and let the caller decide what that means.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, request: &PriceRequest) -> Result<PriceSeries, AnalysisError>;
}
