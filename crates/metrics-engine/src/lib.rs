//! Growth and profitability metrics over a fundamentals time series.
//!
//! A gap in one input never aborts any other metric, period, or the series:
//! every undefined value is reported explicitly with its reason. The engine
//! only errs on contract violations (empty, unsorted, or duplicate-key
//! input collections).

use analysis_core::validate;
use analysis_core::{
    AnalysisError, ComputeNote, FinancialPeriod, FiscalPeriod, GapReason, MetricSeries,
    MetricValue, MetricsAnalyzer, PeriodMetrics,
};
use tracing::{debug, warn};

pub struct MetricsEngine;

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Plain ratio with guarded denominator.
    fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> MetricValue {
        match (numerator, denominator) {
            (Some(n), Some(d)) if d != 0.0 => MetricValue::of(n / d),
            (Some(_), Some(_)) => MetricValue::gap(GapReason::ZeroDenominator),
            _ => MetricValue::gap(GapReason::MissingInput),
        }
    }

    /// Relative change `(current - base) / |base|` against a comparison
    /// period that may be absent from the window.
    fn growth(
        base_period: Option<&FinancialPeriod>,
        current: Option<f64>,
        field: fn(&FinancialPeriod) -> Option<f64>,
    ) -> MetricValue {
        let Some(base_period) = base_period else {
            return MetricValue::gap(GapReason::InsufficientHistory);
        };
        match (current, field(base_period)) {
            (Some(c), Some(b)) if b != 0.0 => MetricValue::of((c - b) / b.abs()),
            (Some(_), Some(_)) => MetricValue::gap(GapReason::ZeroDenominator),
            _ => MetricValue::gap(GapReason::MissingInput),
        }
    }

    /// The period exactly one year before index `i`: same quarter for
    /// quarterly series, the prior annual period for annual series.
    fn year_ago(periods: &[FinancialPeriod], i: usize) -> Option<&FinancialPeriod> {
        let key = periods[i].period;
        let want = FiscalPeriod {
            year: key.year - 1,
            quarter: key.quarter,
        };
        periods[..i].iter().find(|p| p.period == want)
    }

    /// The immediately prior quarter, for QoQ growth. Annual rows and
    /// quarterly rows whose predecessor is annual have no QoQ comparison.
    fn prior_quarter(periods: &[FinancialPeriod], i: usize) -> Option<&FinancialPeriod> {
        if i == 0 || !periods[i].period.is_quarterly() {
            return None;
        }
        let prior = &periods[i - 1];
        prior.period.is_quarterly().then_some(prior)
    }

    /// Return on an average balance: income over the mean of this period's
    /// and the prior period's balance. Without a prior balance the single
    /// period stands in, flagged for the report layer.
    fn return_on_average(
        income: Option<f64>,
        balance: Option<f64>,
        prior_balance: Option<f64>,
    ) -> MetricValue {
        let (Some(income), Some(balance)) = (income, balance) else {
            return MetricValue::gap(GapReason::MissingInput);
        };
        match prior_balance {
            Some(prior) => {
                let average = (balance + prior) / 2.0;
                if average == 0.0 {
                    MetricValue::gap(GapReason::ZeroDenominator)
                } else {
                    MetricValue::of(income / average)
                }
            }
            None => {
                if balance == 0.0 {
                    MetricValue::gap(GapReason::ZeroDenominator)
                } else {
                    MetricValue::of(income / balance).with_note(ComputeNote::SinglePeriodBalance)
                }
            }
        }
    }

    /// Compound annual growth over the full window:
    /// `(last/first)^(1/years) - 1`.
    fn cagr(periods: &[FinancialPeriod], field: fn(&FinancialPeriod) -> Option<f64>) -> MetricValue {
        if periods.len() < 2 {
            return MetricValue::gap(GapReason::InsufficientHistory);
        }
        let first = &periods[0];
        let last = &periods[periods.len() - 1];
        let years = last.period.year_position() - first.period.year_position();
        if years <= 0.0 {
            return MetricValue::gap(GapReason::InsufficientHistory);
        }
        match (field(first), field(last)) {
            (Some(f), Some(l)) => {
                if f == 0.0 {
                    MetricValue::gap(GapReason::ZeroDenominator)
                } else if f < 0.0 || l < 0.0 {
                    MetricValue::gap(GapReason::NonPositiveValue)
                } else {
                    MetricValue::of((l / f).powf(1.0 / years) - 1.0)
                }
            }
            _ => MetricValue::gap(GapReason::MissingInput),
        }
    }

    fn period_metrics(periods: &[FinancialPeriod], i: usize) -> PeriodMetrics {
        let p = &periods[i];
        let prior = (i > 0).then(|| &periods[i - 1]);
        let yoy = Self::year_ago(periods, i);
        let qoq = Self::prior_quarter(periods, i);

        PeriodMetrics {
            period: p.period,
            end_date: p.end_date,
            revenue_yoy: Self::growth(yoy, p.revenue, |x| x.revenue),
            net_income_yoy: Self::growth(yoy, p.net_income, |x| x.net_income),
            eps_yoy: Self::growth(yoy, p.diluted_eps, |x| x.diluted_eps),
            revenue_qoq: Self::growth(qoq, p.revenue, |x| x.revenue),
            net_income_qoq: Self::growth(qoq, p.net_income, |x| x.net_income),
            gross_margin: Self::ratio(p.gross_profit, p.revenue),
            operating_margin: Self::ratio(p.operating_income, p.revenue),
            net_margin: Self::ratio(p.net_income, p.revenue),
            roe: Self::return_on_average(
                p.net_income,
                p.total_equity,
                prior.and_then(|x| x.total_equity),
            ),
            roa: Self::return_on_average(
                p.net_income,
                p.total_assets,
                prior.and_then(|x| x.total_assets),
            ),
            debt_to_equity: Self::ratio(p.total_liabilities, p.total_equity),
            current_ratio: Self::ratio(p.current_assets, p.current_liabilities),
        }
    }
}

impl MetricsAnalyzer for MetricsEngine {
    fn compute(&self, periods: &[FinancialPeriod]) -> Result<MetricSeries, AnalysisError> {
        validate::check_period_contract(periods)?;
        for warning in validate::check_periods(periods) {
            warn!(period = %warning.period, kind = ?warning.kind, "{}", warning.detail);
        }

        let records = (0..periods.len())
            .map(|i| Self::period_metrics(periods, i))
            .collect::<Vec<_>>();
        let span_years = periods[periods.len() - 1].period.year_position()
            - periods[0].period.year_position();

        debug!(periods = periods.len(), span_years, "computed metric series");
        Ok(MetricSeries {
            periods: records,
            revenue_cagr: Self::cagr(periods, |p| p.revenue),
            net_income_cagr: Self::cagr(periods, |p| p.net_income),
            eps_cagr: Self::cagr(periods, |p| p.diluted_eps),
            span_years,
        })
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new()
    }
}
