use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fiscal period key: a year plus an optional quarter (1-4).
///
/// Annual periods carry no quarter. Ordering is (year, quarter), which is
/// chronological within a homogeneous series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub year: i32,
    pub quarter: Option<u8>,
}

impl FiscalPeriod {
    pub fn annual(year: i32) -> Self {
        Self { year, quarter: None }
    }

    pub fn quarterly(year: i32, quarter: u8) -> Self {
        Self {
            year,
            quarter: Some(quarter),
        }
    }

    pub fn is_quarterly(&self) -> bool {
        self.quarter.is_some()
    }

    /// Position of the period on a fractional-year axis (quarters count 0.25).
    /// Spans between periods come out exact for both annual and quarterly series.
    pub fn year_position(&self) -> f64 {
        let offset = self.quarter.map_or(0.0, |q| f64::from(q.saturating_sub(1)) / 4.0);
        f64::from(self.year) + offset
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quarter {
            Some(q) => write!(f, "{}Q{}", self.year, q),
            None => write!(f, "{}", self.year),
        }
    }
}

/// One reported fiscal period of company fundamentals.
///
/// Every statement line is optional: absence means the company did not report
/// the figure, never that it was zero. `end_date` is the statement date the
/// acquisition layer normalized the period to; price alignment depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialPeriod {
    pub period: FiscalPeriod,
    pub end_date: NaiveDate,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_equity: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub depreciation_amortization: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub diluted_shares: Option<f64>,
    pub diluted_eps: Option<f64>,
}

impl FinancialPeriod {
    /// A period with every statement line unreported.
    pub fn new(period: FiscalPeriod, end_date: NaiveDate) -> Self {
        Self {
            period,
            end_date,
            revenue: None,
            gross_profit: None,
            operating_income: None,
            net_income: None,
            total_assets: None,
            total_liabilities: None,
            total_equity: None,
            current_assets: None,
            current_liabilities: None,
            total_debt: None,
            cash_and_equivalents: None,
            depreciation_amortization: None,
            operating_cash_flow: None,
            capital_expenditure: None,
            diluted_shares: None,
            diluted_eps: None,
        }
    }

    /// Free cash flow for the period, when both components were reported.
    pub fn free_cash_flow(&self) -> Option<f64> {
        match (self.operating_cash_flow, self.capital_expenditure) {
            (Some(ocf), Some(capex)) => Some(ocf - capex),
            _ => None,
        }
    }
}

/// A single daily closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Trailing multiples for one comparable company as of a snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerQuote {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub pe: Option<f64>,
    pub ps: Option<f64>,
    pub pb: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
}

/// Categorical analyst rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::StrongBuy,
        Rating::Buy,
        Rating::Hold,
        Rating::Sell,
        Rating::StrongSell,
    ];

    /// Numeric score used for display bucketing only; category counts are the
    /// primary output since rating semantics differ by firm.
    pub fn score(&self) -> i8 {
        match self {
            Rating::StrongBuy => 2,
            Rating::Buy => 1,
            Rating::Hold => 0,
            Rating::Sell => -1,
            Rating::StrongSell => -2,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Rating::StrongBuy => "Strong Buy",
            Rating::Buy => "Buy",
            Rating::Hold => "Hold",
            Rating::Sell => "Sell",
            Rating::StrongSell => "Strong Sell",
        }
    }
}

/// One analyst record from a covering firm. A firm may publish many records
/// over time; the aggregator keeps the latest per firm for consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystRecord {
    pub firm: String,
    pub date: NaiveDate,
    pub rating: Rating,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub eps_estimate: Option<f64>,
}

/// Why a derived value could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    MissingInput,
    ZeroDenominator,
    NonPositiveValue,
    InsufficientHistory,
    InsufficientSample,
}

/// A fallback that still produced a value, flagged for the report layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeNote {
    SinglePeriodBalance,
    EbitdaApproximated,
}

/// A derived value that may be absent, carrying the reason when it is.
///
/// Data-quality gaps never surface as errors or sentinel zeros: the value is
/// `None` and `reason` says why, so downstream layers can tell "not
/// applicable" apart from "computation failed".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<GapReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<ComputeNote>,
}

impl MetricValue {
    pub fn of(value: f64) -> Self {
        Self {
            value: Some(value),
            reason: None,
            note: None,
        }
    }

    pub fn gap(reason: GapReason) -> Self {
        Self {
            value: None,
            reason: Some(reason),
            note: None,
        }
    }

    pub fn with_note(mut self, note: ComputeNote) -> Self {
        self.note = Some(note);
        self
    }

    pub fn get(&self) -> Option<f64> {
        self.value
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

/// Derived metrics for one fiscal period, aligned to the input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: FiscalPeriod,
    pub end_date: NaiveDate,
    pub revenue_yoy: MetricValue,
    pub net_income_yoy: MetricValue,
    pub eps_yoy: MetricValue,
    pub revenue_qoq: MetricValue,
    pub net_income_qoq: MetricValue,
    pub gross_margin: MetricValue,
    pub operating_margin: MetricValue,
    pub net_margin: MetricValue,
    pub roe: MetricValue,
    pub roa: MetricValue,
    pub debt_to_equity: MetricValue,
    pub current_ratio: MetricValue,
}

/// Output of the metrics engine: one record per input period plus
/// full-window compound growth rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub periods: Vec<PeriodMetrics>,
    pub revenue_cagr: MetricValue,
    pub net_income_cagr: MetricValue,
    pub eps_cagr: MetricValue,
    /// Span of the window in years, from the first to the last period key.
    pub span_years: f64,
}

/// A valuation multiple with its historical and peer context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultipleView {
    pub value: MetricValue,
    /// Rank of the current value inside its own history, 0.0 to 1.0.
    pub percentile: MetricValue,
    /// (current - peer median) / peer median.
    pub peer_delta: MetricValue,
}

/// Assumptions behind the DCF reference estimate, echoed verbatim in the
/// output for reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfAssumptions {
    pub horizon_years: u32,
    pub growth_rate: f64,
    pub terminal_growth: f64,
    pub discount_rate: f64,
}

impl Default for DcfAssumptions {
    fn default() -> Self {
        Self {
            horizon_years: 5,
            growth_rate: 0.05,
            terminal_growth: 0.02,
            discount_rate: 0.10,
        }
    }
}

/// Single-stage perpetuity-growth DCF estimate. A reference point, not a
/// precise valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfReference {
    pub equity_value: MetricValue,
    pub value_per_share: MetricValue,
    pub assumptions: DcfAssumptions,
}

/// Current multiples with percentile and peer context, plus the DCF
/// reference. Any field may independently be a gap; the snapshot always
/// materializes with whatever could be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub latest_price: f64,
    pub market_cap: MetricValue,
    pub pe: MultipleView,
    pub ps: MultipleView,
    pub pb: MultipleView,
    pub ev_to_ebitda: MultipleView,
    pub peg: MetricValue,
    pub dcf: DcfReference,
}

/// Borrowed inputs for one valuation computation.
#[derive(Debug, Clone, Copy)]
pub struct ValuationInputs<'a> {
    pub periods: &'a [FinancialPeriod],
    pub metrics: &'a MetricSeries,
    pub prices: &'a [PriceObservation],
    pub peers: &'a [PeerQuote],
    pub latest_price: f64,
}

/// Consensus target-price statistics across covering firms. Dispersion is
/// exposed, not hidden: target spread signals disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusTarget {
    pub mean: MetricValue,
    pub median: MetricValue,
    pub std_dev: MetricValue,
    pub high: MetricValue,
    pub low: MetricValue,
    /// Firms whose latest record carried a target price.
    pub contributors: usize,
}

/// Count and fraction for one rating category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingBucket {
    pub rating: Rating,
    pub score: i8,
    pub count: usize,
    pub fraction: f64,
}

/// Overall direction of recent EPS estimate revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Improving,
    Deteriorating,
    Stable,
    Mixed,
}

impl TrendLabel {
    pub fn to_label(&self) -> &'static str {
        match self {
            TrendLabel::Improving => "Improving",
            TrendLabel::Deteriorating => "Deteriorating",
            TrendLabel::Stable => "Stable",
            TrendLabel::Mixed => "Mixed",
        }
    }
}

/// Up/down/flat transition counts behind the trend label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTrend {
    pub up: usize,
    pub down: usize,
    pub flat: usize,
    pub label: TrendLabel,
}

/// Output of the analyst aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystSummary {
    /// Distinct firms after supersession.
    pub firms: usize,
    /// All five categories, zero counts included, fractions over `firms`.
    pub distribution: Vec<RatingBucket>,
    pub consensus_target: ConsensusTarget,
    pub revision_trend: RevisionTrend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiscal_period_ordering_and_display() {
        let a = FiscalPeriod::quarterly(2023, 4);
        let b = FiscalPeriod::quarterly(2024, 1);
        assert!(a < b);
        assert_eq!(a.to_string(), "2023Q4");
        assert_eq!(FiscalPeriod::annual(2023).to_string(), "2023");
    }

    #[test]
    fn year_position_spans() {
        let q1 = FiscalPeriod::quarterly(2023, 1);
        let q1_next = FiscalPeriod::quarterly(2024, 1);
        assert!((q1_next.year_position() - q1.year_position() - 1.0).abs() < 1e-12);

        let a = FiscalPeriod::annual(2020);
        let b = FiscalPeriod::annual(2023);
        assert!((b.year_position() - a.year_position() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn metric_value_gap_serializes_reason_verbatim() {
        let gap = MetricValue::gap(GapReason::ZeroDenominator);
        let json = serde_json::to_value(&gap).unwrap();
        assert_eq!(json["value"], serde_json::Value::Null);
        assert_eq!(json["reason"], "zero_denominator");

        let back: MetricValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, gap);
    }

    #[test]
    fn metric_value_of_omits_reason() {
        let v = MetricValue::of(1.5);
        let json = serde_json::to_string(&v).unwrap();
        assert!(!json.contains("reason"));
        assert!(!json.contains("note"));
    }

    #[test]
    fn compute_note_survives_round_trip() {
        let v = MetricValue::of(8.0).with_note(ComputeNote::EbitdaApproximated);
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("ebitda_approximated"));
        let back: MetricValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn free_cash_flow_needs_both_components() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let mut p = FinancialPeriod::new(FiscalPeriod::annual(2023), date);
        assert_eq!(p.free_cash_flow(), None);
        p.operating_cash_flow = Some(120.0);
        assert_eq!(p.free_cash_flow(), None);
        p.capital_expenditure = Some(45.0);
        assert_eq!(p.free_cash_flow(), Some(75.0));
    }

    #[test]
    fn rating_scores_are_display_only_ordering() {
        assert_eq!(Rating::StrongBuy.score(), 2);
        assert_eq!(Rating::StrongSell.score(), -2);
        assert_eq!(
            serde_json::to_value(Rating::StrongBuy).unwrap(),
            serde_json::Value::String("strong_buy".into())
        );
    }
}
