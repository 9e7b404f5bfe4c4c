//! Input validation: hard contract checks shared by the engines, plus
//! advisory data-quality checks recovered from upstream statement data.

use crate::error::AnalysisError;
use crate::types::{FinancialPeriod, FiscalPeriod, PriceObservation};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Relative tolerance for the balance-sheet equation check (1%).
pub const BALANCE_SHEET_TOLERANCE: f64 = 0.01;

/// Reject empty, unsorted, or duplicate-key period collections.
pub fn check_period_contract(periods: &[FinancialPeriod]) -> Result<(), AnalysisError> {
    if periods.is_empty() {
        return Err(AnalysisError::EmptyInput("financial period"));
    }
    for pair in periods.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        match prev.period.cmp(&next.period) {
            Ordering::Less => {}
            Ordering::Equal => return Err(AnalysisError::DuplicatePeriod(next.period)),
            Ordering::Greater => {
                return Err(AnalysisError::UnsortedPeriods {
                    prev: prev.period,
                    next: next.period,
                })
            }
        }
        if next.end_date < prev.end_date {
            return Err(AnalysisError::UnsortedPeriods {
                prev: prev.period,
                next: next.period,
            });
        }
    }
    Ok(())
}

/// Reject unsorted or duplicate-date price sequences. An empty sequence is
/// fine; it only starves the percentile sample.
pub fn check_price_contract(prices: &[PriceObservation]) -> Result<(), AnalysisError> {
    for pair in prices.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        match prev.date.cmp(&next.date) {
            Ordering::Less => {}
            Ordering::Equal => return Err(AnalysisError::DuplicatePriceDate(next.date)),
            Ordering::Greater => {
                return Err(AnalysisError::UnsortedPrices {
                    prev: prev.date,
                    next: next.date,
                })
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    BalanceSheetEquation,
    MarginOrdering,
}

/// A non-fatal data-quality finding on one period. Advisory only: the
/// engines log these and keep computing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub period: FiscalPeriod,
    pub kind: WarningKind,
    pub detail: String,
}

/// Run the data-quality checks with the default balance tolerance.
pub fn check_periods(periods: &[FinancialPeriod]) -> Vec<ValidationWarning> {
    check_periods_with_tolerance(periods, BALANCE_SHEET_TOLERANCE)
}

/// Data-quality checks on each period:
///
/// - balance-sheet equation: assets should equal liabilities + equity
///   within `tolerance` of assets;
/// - margin ordering: revenue >= gross profit >= operating income when the
///   fields are present (net income may legitimately exceed operating
///   income through non-operating items).
pub fn check_periods_with_tolerance(
    periods: &[FinancialPeriod],
    tolerance: f64,
) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    for p in periods {
        if let (Some(assets), Some(liabilities), Some(equity)) =
            (p.total_assets, p.total_liabilities, p.total_equity)
        {
            let diff = assets - (liabilities + equity);
            if assets != 0.0 && diff.abs() > tolerance * assets.abs() {
                warnings.push(ValidationWarning {
                    period: p.period,
                    kind: WarningKind::BalanceSheetEquation,
                    detail: format!(
                        "assets {assets:.2} != liabilities {liabilities:.2} + equity {equity:.2} (difference {diff:.2})"
                    ),
                });
            }
        }
        if let (Some(revenue), Some(gross)) = (p.revenue, p.gross_profit) {
            if gross > revenue {
                warnings.push(ValidationWarning {
                    period: p.period,
                    kind: WarningKind::MarginOrdering,
                    detail: format!("gross profit {gross:.2} exceeds revenue {revenue:.2}"),
                });
            }
        }
        if let (Some(gross), Some(operating)) = (p.gross_profit, p.operating_income) {
            if operating > gross {
                warnings.push(ValidationWarning {
                    period: p.period,
                    kind: WarningKind::MarginOrdering,
                    detail: format!(
                        "operating income {operating:.2} exceeds gross profit {gross:.2}"
                    ),
                });
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn annual(year: i32) -> FinancialPeriod {
        FinancialPeriod::new(FiscalPeriod::annual(year), date(year, 12, 31))
    }

    #[test]
    fn empty_periods_rejected() {
        assert_eq!(
            check_period_contract(&[]),
            Err(AnalysisError::EmptyInput("financial period"))
        );
    }

    #[test]
    fn duplicate_period_key_rejected() {
        let periods = vec![annual(2022), annual(2022)];
        assert_eq!(
            check_period_contract(&periods),
            Err(AnalysisError::DuplicatePeriod(FiscalPeriod::annual(2022)))
        );
    }

    #[test]
    fn unsorted_period_keys_rejected() {
        let periods = vec![annual(2023), annual(2022)];
        assert!(matches!(
            check_period_contract(&periods),
            Err(AnalysisError::UnsortedPeriods { .. })
        ));
    }

    #[test]
    fn misordered_end_dates_rejected() {
        let mut first = annual(2022);
        first.end_date = date(2024, 6, 30); // later than 2023's statement date
        let periods = vec![first, annual(2023)];
        assert!(matches!(
            check_period_contract(&periods),
            Err(AnalysisError::UnsortedPeriods { .. })
        ));
    }

    #[test]
    fn duplicate_price_dates_rejected() {
        let prices = vec![
            PriceObservation {
                date: date(2024, 1, 2),
                close: 10.0,
                volume: None,
            },
            PriceObservation {
                date: date(2024, 1, 2),
                close: 11.0,
                volume: None,
            },
        ];
        assert_eq!(
            check_price_contract(&prices),
            Err(AnalysisError::DuplicatePriceDate(date(2024, 1, 2)))
        );
    }

    #[test]
    fn balance_sheet_equation_warning() {
        let mut p = annual(2023);
        p.total_assets = Some(1000.0);
        p.total_liabilities = Some(400.0);
        p.total_equity = Some(500.0); // off by 10%
        let warnings = check_periods(&[p]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::BalanceSheetEquation);
    }

    #[test]
    fn balanced_sheet_within_tolerance_passes() {
        let mut p = annual(2023);
        p.total_assets = Some(1000.0);
        p.total_liabilities = Some(401.0);
        p.total_equity = Some(595.0); // off by 0.4%
        assert!(check_periods(&[p]).is_empty());
    }

    #[test]
    fn margin_ordering_warning() {
        let mut p = annual(2023);
        p.revenue = Some(100.0);
        p.gross_profit = Some(130.0);
        let warnings = check_periods(&[p]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MarginOrdering);
    }
}
