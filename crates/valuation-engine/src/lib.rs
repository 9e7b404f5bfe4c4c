//! Valuation multiples with historical percentile context, peer-relative
//! deltas, PEG, and a discounted-cash-flow reference estimate.
//!
//! Every output field may independently be a gap; the snapshot always
//! materializes with whatever could be computed. Only contract violations
//! (malformed inputs, non-convergent configuration) surface as errors.

mod dcf;

use analysis_core::stats;
use analysis_core::validate;
use analysis_core::{
    AnalysisError, ComputeNote, DcfAssumptions, FinancialPeriod, FiscalPeriod, GapReason,
    MetricValue, MultipleView, PeerQuote, PriceObservation, ValuationAnalyzer, ValuationInputs,
    ValuationSnapshot,
};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Valuation configuration. Defaults: five-year lookback, eight-observation
/// percentile floor, and the standard DCF assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Lookback window for the historical multiple distribution, in years.
    pub lookback_years: u32,
    /// Minimum historical observations required to rank a multiple.
    pub min_percentile_sample: usize,
    pub dcf: DcfAssumptions,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            lookback_years: 5,
            min_percentile_sample: 8,
            dcf: DcfAssumptions::default(),
        }
    }
}

impl ValuationConfig {
    /// Reject invalid combinations before any computation runs.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.lookback_years == 0 {
            return Err(AnalysisError::InvalidConfig(
                "lookback_years must be at least 1".into(),
            ));
        }
        if self.min_percentile_sample == 0 {
            return Err(AnalysisError::InvalidConfig(
                "min_percentile_sample must be at least 1".into(),
            ));
        }
        if self.dcf.horizon_years == 0 {
            return Err(AnalysisError::InvalidConfig(
                "dcf horizon_years must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("growth_rate", self.dcf.growth_rate),
            ("terminal_growth", self.dcf.terminal_growth),
            ("discount_rate", self.dcf.discount_rate),
        ] {
            if !value.is_finite() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "dcf {name} must be finite, got {value}"
                )));
            }
        }
        if self.dcf.discount_rate <= self.dcf.terminal_growth {
            return Err(AnalysisError::InvalidConfig(format!(
                "discount rate {} must exceed terminal growth {} for the terminal value to converge",
                self.dcf.discount_rate, self.dcf.terminal_growth
            )));
        }
        Ok(())
    }
}

pub struct ValuationEngine {
    config: ValuationConfig,
}

impl ValuationEngine {
    pub fn new() -> Self {
        Self {
            config: ValuationConfig::default(),
        }
    }

    pub fn with_config(config: ValuationConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// A denominator that must be strictly positive to carry a multiple.
    fn positive(value: Option<f64>) -> Result<f64, GapReason> {
        match value {
            None => Err(GapReason::MissingInput),
            Some(v) if v > 0.0 => Ok(v),
            Some(v) if v == 0.0 => Err(GapReason::ZeroDenominator),
            Some(_) => Err(GapReason::NonPositiveValue),
        }
    }

    fn next_quarter_of(a: FiscalPeriod, b: FiscalPeriod) -> bool {
        match (a.quarter, b.quarter) {
            (Some(4), Some(1)) => b.year == a.year + 1,
            (Some(qa), Some(qb)) => b.year == a.year && qb == qa + 1,
            _ => false,
        }
    }

    /// Trailing-twelve-month flow ending at index `i`: the sum of the four
    /// consecutive trailing quarters for quarterly series, the period's own
    /// value for annual series.
    pub(crate) fn ttm_at(
        periods: &[FinancialPeriod],
        i: usize,
        field: impl Fn(&FinancialPeriod) -> Option<f64>,
    ) -> MetricValue {
        let p = &periods[i];
        if !p.period.is_quarterly() {
            return match field(p) {
                Some(v) => MetricValue::of(v),
                None => MetricValue::gap(GapReason::MissingInput),
            };
        }
        if i < 3 {
            return MetricValue::gap(GapReason::InsufficientHistory);
        }
        let window = &periods[i - 3..=i];
        for pair in window.windows(2) {
            if !Self::next_quarter_of(pair[0].period, pair[1].period) {
                return MetricValue::gap(GapReason::InsufficientHistory);
            }
        }
        let mut sum = 0.0;
        for q in window {
            match field(q) {
                Some(v) => sum += v,
                None => return MetricValue::gap(GapReason::MissingInput),
            }
        }
        MetricValue::of(sum)
    }

    /// Price over a per-share denominator, propagating the denominator's
    /// gap reason and note.
    fn price_over(price: f64, denominator: MetricValue) -> MetricValue {
        let Some(d) = denominator.value else {
            return MetricValue {
                value: None,
                reason: denominator.reason,
                note: denominator.note,
            };
        };
        match Self::positive(Some(d)) {
            Ok(d) => {
                let mut out = MetricValue::of(price / d);
                if let Some(note) = denominator.note {
                    out = out.with_note(note);
                }
                out
            }
            Err(reason) => MetricValue::gap(reason),
        }
    }

    fn pe_at(periods: &[FinancialPeriod], i: usize, price: f64) -> MetricValue {
        Self::price_over(price, Self::ttm_at(periods, i, |p| p.diluted_eps))
    }

    fn ps_at(periods: &[FinancialPeriod], i: usize, price: f64) -> MetricValue {
        let shares = match Self::positive(periods[i].diluted_shares) {
            Ok(s) => s,
            Err(reason) => return MetricValue::gap(reason),
        };
        let revenue = Self::ttm_at(periods, i, |p| p.revenue);
        let per_share = match revenue.value {
            Some(v) => MetricValue::of(v / shares),
            None => revenue,
        };
        Self::price_over(price, per_share)
    }

    fn pb_at(periods: &[FinancialPeriod], i: usize, price: f64) -> MetricValue {
        let shares = match Self::positive(periods[i].diluted_shares) {
            Ok(s) => s,
            Err(reason) => return MetricValue::gap(reason),
        };
        // Book value is point-in-time, not a trailing flow.
        let Some(equity) = periods[i].total_equity else {
            return MetricValue::gap(GapReason::MissingInput);
        };
        Self::price_over(price, MetricValue::of(equity / shares))
    }

    fn ev_to_ebitda_at(periods: &[FinancialPeriod], i: usize, price: f64) -> MetricValue {
        let p = &periods[i];
        let shares = match Self::positive(p.diluted_shares) {
            Ok(s) => s,
            Err(reason) => return MetricValue::gap(reason),
        };
        let (Some(debt), Some(cash)) = (p.total_debt, p.cash_and_equivalents) else {
            return MetricValue::gap(GapReason::MissingInput);
        };
        // EBITDA = operating income + D&A; operating income alone stands in
        // when D&A is unreported, flagged for the report layer.
        let strict = Self::ttm_at(periods, i, |p| {
            p.operating_income
                .zip(p.depreciation_amortization)
                .map(|(oi, da)| oi + da)
        });
        let ebitda = if strict.is_available() {
            strict
        } else {
            let approximate = Self::ttm_at(periods, i, |p| p.operating_income);
            if approximate.is_available() {
                approximate.with_note(ComputeNote::EbitdaApproximated)
            } else {
                approximate
            }
        };
        let Some(e) = ebitda.value else {
            return MetricValue {
                value: None,
                reason: ebitda.reason,
                note: None,
            };
        };
        if e == 0.0 {
            return MetricValue::gap(GapReason::ZeroDenominator);
        }
        if e < 0.0 {
            return MetricValue::gap(GapReason::NonPositiveValue);
        }
        let enterprise_value = price * shares + debt - cash;
        let mut out = MetricValue::of(enterprise_value / e);
        if let Some(note) = ebitda.note {
            out = out.with_note(note);
        }
        out
    }

    fn last_close_on_or_before(prices: &[PriceObservation], date: NaiveDate) -> Option<f64> {
        prices.iter().rev().find(|p| p.date <= date).map(|p| p.close)
    }

    /// The historical distribution of one multiple: recomputed at each
    /// period inside the lookback window, against the last close on or
    /// before that period's statement date.
    fn history_sample(
        &self,
        inputs: &ValuationInputs<'_>,
        multiple: fn(&[FinancialPeriod], usize, f64) -> MetricValue,
    ) -> Vec<f64> {
        let periods = inputs.periods;
        let latest_end = periods[periods.len() - 1].end_date;
        let cutoff = latest_end
            .checked_sub_months(Months::new(12 * self.config.lookback_years))
            .unwrap_or(NaiveDate::MIN);
        let mut sample = Vec::new();
        for (i, p) in periods.iter().enumerate() {
            if p.end_date < cutoff {
                continue;
            }
            let Some(close) = Self::last_close_on_or_before(inputs.prices, p.end_date) else {
                continue;
            };
            if let Some(v) = multiple(periods, i, close).value {
                if v.is_finite() {
                    sample.push(v);
                }
            }
        }
        sample
    }

    fn rank_in_history(&self, current: MetricValue, sample: &[f64]) -> MetricValue {
        let Some(v) = current.value else {
            return MetricValue::gap(GapReason::MissingInput);
        };
        if sample.len() < self.config.min_percentile_sample {
            return MetricValue::gap(GapReason::InsufficientSample);
        }
        MetricValue::of(stats::percentile_rank(v, sample))
    }

    /// Delta to the peer median. Peers missing this multiple are excluded
    /// from the median, not dropped from the set.
    fn peer_delta(
        current: MetricValue,
        peers: &[PeerQuote],
        field: fn(&PeerQuote) -> Option<f64>,
    ) -> MetricValue {
        let Some(v) = current.value else {
            return MetricValue::gap(GapReason::MissingInput);
        };
        let values: Vec<f64> = peers
            .iter()
            .filter_map(field)
            .filter(|x| x.is_finite())
            .collect();
        if values.is_empty() {
            return MetricValue::gap(GapReason::MissingInput);
        }
        let median = stats::median(&values);
        if median == 0.0 {
            return MetricValue::gap(GapReason::ZeroDenominator);
        }
        MetricValue::of((v - median) / median)
    }

    /// PEG = P/E over the trailing EPS growth rate expressed as a
    /// percentage number (growth of 0.15 ranks as 15). Non-positive growth
    /// makes the ratio meaningless, not merely negative.
    fn peg(pe: MetricValue, growth: MetricValue) -> MetricValue {
        let Some(pe_value) = pe.value else {
            return MetricValue::gap(pe.reason.unwrap_or(GapReason::MissingInput));
        };
        let Some(g) = growth.value else {
            return MetricValue::gap(growth.reason.unwrap_or(GapReason::MissingInput));
        };
        if g <= 0.0 {
            return MetricValue::gap(GapReason::NonPositiveValue);
        }
        MetricValue::of(pe_value / (g * 100.0))
    }

    fn view(
        &self,
        inputs: &ValuationInputs<'_>,
        multiple: fn(&[FinancialPeriod], usize, f64) -> MetricValue,
        peer_field: fn(&PeerQuote) -> Option<f64>,
    ) -> MultipleView {
        let last = inputs.periods.len() - 1;
        let current = multiple(inputs.periods, last, inputs.latest_price);
        let sample = self.history_sample(inputs, multiple);
        MultipleView {
            value: current,
            percentile: self.rank_in_history(current, &sample),
            peer_delta: Self::peer_delta(current, inputs.peers, peer_field),
        }
    }
}

impl ValuationAnalyzer for ValuationEngine {
    fn compute(&self, inputs: &ValuationInputs<'_>) -> Result<ValuationSnapshot, AnalysisError> {
        validate::check_period_contract(inputs.periods)?;
        validate::check_price_contract(inputs.prices)?;
        if !inputs.latest_price.is_finite() || inputs.latest_price <= 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "latest price must be positive and finite, got {}",
                inputs.latest_price
            )));
        }
        if inputs.metrics.periods.len() != inputs.periods.len() {
            return Err(AnalysisError::InvalidData(format!(
                "metric series length {} does not match period count {}",
                inputs.metrics.periods.len(),
                inputs.periods.len()
            )));
        }

        let pe = self.view(inputs, Self::pe_at, |q| q.pe);
        let ps = self.view(inputs, Self::ps_at, |q| q.ps);
        let pb = self.view(inputs, Self::pb_at, |q| q.pb);
        let ev_to_ebitda = self.view(inputs, Self::ev_to_ebitda_at, |q| q.ev_to_ebitda);

        let trailing_eps_growth = inputs
            .metrics
            .periods
            .last()
            .map(|m| m.eps_yoy)
            .unwrap_or_else(|| MetricValue::gap(GapReason::InsufficientHistory));
        let peg = Self::peg(pe.value, trailing_eps_growth);

        let last = &inputs.periods[inputs.periods.len() - 1];
        let market_cap = match Self::positive(last.diluted_shares) {
            Ok(shares) => MetricValue::of(inputs.latest_price * shares),
            Err(reason) => MetricValue::gap(reason),
        };

        let dcf = dcf::reference(inputs.periods, &self.config.dcf);

        debug!(
            pe = ?pe.value.value,
            ps = ?ps.value.value,
            pb = ?pb.value.value,
            peers = inputs.peers.len(),
            "computed valuation snapshot"
        );
        Ok(ValuationSnapshot {
            latest_price: inputs.latest_price,
            market_cap,
            pe,
            ps,
            pb,
            ev_to_ebitda,
            peg,
            dcf,
        })
    }
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::new()
    }
}
