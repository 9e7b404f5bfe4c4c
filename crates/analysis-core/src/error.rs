use crate::types::FiscalPeriod;
use chrono::NaiveDate;
use thiserror::Error;

/// Contract violations. Data-quality gaps never appear here; they are
/// reported per field as [`crate::MetricValue`] gaps.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("empty input: at least one {0} is required")]
    EmptyInput(&'static str),

    #[error("periods out of order: {next} follows {prev}")]
    UnsortedPeriods {
        prev: FiscalPeriod,
        next: FiscalPeriod,
    },

    #[error("duplicate period key: {0}")]
    DuplicatePeriod(FiscalPeriod),

    #[error("price dates out of order: {next} follows {prev}")]
    UnsortedPrices { prev: NaiveDate, next: NaiveDate },

    #[error("duplicate price date: {0}")]
    DuplicatePriceDate(NaiveDate),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
