use crate::error::AnalysisError;
use crate::types::{
    AnalystRecord, AnalystSummary, FinancialPeriod, MetricSeries, ValuationInputs,
    ValuationSnapshot,
};
use chrono::NaiveDate;

/// Trait for metric-series engines. Pure and synchronous: same input, same
/// output, no retained state between invocations.
pub trait MetricsAnalyzer: Send + Sync {
    fn compute(&self, periods: &[FinancialPeriod]) -> Result<MetricSeries, AnalysisError>;
}

/// Trait for valuation engines.
pub trait ValuationAnalyzer: Send + Sync {
    fn compute(&self, inputs: &ValuationInputs<'_>) -> Result<ValuationSnapshot, AnalysisError>;
}

/// Trait for analyst-record aggregators. `as_of` anchors the trailing
/// revision window so the computation stays deterministic.
pub trait AnalystSummarizer: Send + Sync {
    fn summarize(
        &self,
        records: &[AnalystRecord],
        as_of: NaiveDate,
    ) -> Result<AnalystSummary, AnalysisError>;
}
