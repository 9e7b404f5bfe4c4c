//! Single-stage perpetuity-growth DCF reference estimate.
//!
//! Projects trailing free cash flow over an explicit horizon, discounts
//! each year and a terminal value back to present, and divides by diluted
//! shares. Configurations with `discount_rate <= terminal_growth` never
//! reach this module; the engine rejects them at construction.

use crate::ValuationEngine;
use analysis_core::{DcfAssumptions, DcfReference, FinancialPeriod, GapReason, MetricValue};

pub(crate) fn reference(periods: &[FinancialPeriod], assumptions: &DcfAssumptions) -> DcfReference {
    match equity_value(periods, assumptions) {
        Ok((equity, per_share)) => DcfReference {
            equity_value: MetricValue::of(equity),
            value_per_share: MetricValue::of(per_share),
            assumptions: *assumptions,
        },
        Err(reason) => DcfReference {
            equity_value: MetricValue::gap(reason),
            value_per_share: MetricValue::gap(reason),
            assumptions: *assumptions,
        },
    }
}

fn equity_value(
    periods: &[FinancialPeriod],
    assumptions: &DcfAssumptions,
) -> Result<(f64, f64), GapReason> {
    let last = periods.len() - 1;
    let trailing = ValuationEngine::ttm_at(periods, last, FinancialPeriod::free_cash_flow);
    let Some(fcf) = trailing.value else {
        return Err(trailing.reason.unwrap_or(GapReason::MissingInput));
    };
    if fcf <= 0.0 {
        return Err(GapReason::NonPositiveValue);
    }
    let shares = match periods[last].diluted_shares {
        None => return Err(GapReason::MissingInput),
        Some(s) if s == 0.0 => return Err(GapReason::ZeroDenominator),
        Some(s) if s < 0.0 => return Err(GapReason::NonPositiveValue),
        Some(s) => s,
    };

    let growth = 1.0 + assumptions.growth_rate;
    let discount = 1.0 + assumptions.discount_rate;
    let horizon = assumptions.horizon_years as i32;

    let mut present_value = 0.0;
    for year in 1..=horizon {
        present_value += fcf * growth.powi(year) / discount.powi(year);
    }
    let terminal_fcf = fcf * growth.powi(horizon) * (1.0 + assumptions.terminal_growth);
    let terminal_value = terminal_fcf / (assumptions.discount_rate - assumptions.terminal_growth);
    let equity = present_value + terminal_value / discount.powi(horizon);
    Ok((equity, equity / shares))
}
