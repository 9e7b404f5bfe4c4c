//! Analyst-record aggregation: rating distribution, consensus price target,
//! and EPS-revision trend.
//!
//! A firm's newer record supersedes its older ones for the distribution and
//! consensus statistics; revisions are read from the full in-window record
//! stream, since supersession would erase the transitions the trend is
//! built from.

use analysis_core::stats;
use analysis_core::{
    AnalysisError, AnalystRecord, AnalystSummarizer, AnalystSummary, ConsensusTarget, GapReason,
    MetricValue, Rating, RatingBucket, RevisionTrend, TrendLabel,
};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

/// Aggregation configuration. Defaults: 90-day revision window, 0.5%
/// flat threshold to keep rounding noise out of the trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Trailing window for EPS-revision transitions, in days.
    pub revision_window_days: u32,
    /// Relative change below which a revision counts as flat.
    pub flat_threshold: f64,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            revision_window_days: 90,
            flat_threshold: 0.005,
        }
    }
}

impl AnalystConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.revision_window_days == 0 {
            return Err(AnalysisError::InvalidConfig(
                "revision_window_days must be at least 1".into(),
            ));
        }
        if !self.flat_threshold.is_finite() || self.flat_threshold < 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "flat_threshold must be non-negative and finite, got {}",
                self.flat_threshold
            )));
        }
        Ok(())
    }
}

enum Direction {
    Up,
    Down,
    Flat,
}

pub struct AnalystAggregator {
    config: AnalystConfig,
}

impl AnalystAggregator {
    pub fn new() -> Self {
        Self {
            config: AnalystConfig::default(),
        }
    }

    pub fn with_config(config: AnalystConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalystConfig {
        &self.config
    }

    /// Latest record per firm. Supersession, not accumulation; ties on
    /// date resolve to the record seen last.
    fn latest_per_firm(records: &[AnalystRecord]) -> BTreeMap<&str, &AnalystRecord> {
        let mut latest: BTreeMap<&str, &AnalystRecord> = BTreeMap::new();
        for record in records {
            match latest.get(record.firm.as_str()) {
                Some(existing) if existing.date > record.date => {}
                _ => {
                    latest.insert(record.firm.as_str(), record);
                }
            }
        }
        latest
    }

    /// Counts and fractions for all five categories, zero counts included.
    /// The numeric scores are display bucketing only: category semantics
    /// differ by firm, so no blended score is derived from them.
    fn distribution(latest: &BTreeMap<&str, &AnalystRecord>) -> Vec<RatingBucket> {
        let firms = latest.len();
        Rating::ALL
            .iter()
            .map(|&rating| {
                let count = latest.values().filter(|r| r.rating == rating).count();
                RatingBucket {
                    rating,
                    score: rating.score(),
                    count,
                    fraction: count as f64 / firms as f64,
                }
            })
            .collect()
    }

    fn consensus(latest: &BTreeMap<&str, &AnalystRecord>) -> ConsensusTarget {
        let targets: Vec<f64> = latest
            .values()
            .filter_map(|r| r.target_price)
            .filter(|t| t.is_finite())
            .collect();
        if targets.is_empty() {
            let gap = MetricValue::gap(GapReason::MissingInput);
            return ConsensusTarget {
                mean: gap,
                median: gap,
                std_dev: gap,
                high: gap,
                low: gap,
                contributors: 0,
            };
        }
        let slice = targets.as_slice();
        let std_dev = if targets.len() >= 2 {
            MetricValue::of(slice.std_dev())
        } else {
            MetricValue::gap(GapReason::InsufficientSample)
        };
        ConsensusTarget {
            mean: MetricValue::of(slice.mean()),
            median: MetricValue::of(stats::median(slice)),
            std_dev,
            high: MetricValue::of(slice.max()),
            low: MetricValue::of(slice.min()),
            contributors: targets.len(),
        }
    }

    fn classify(&self, prev: f64, next: f64) -> Direction {
        if prev == 0.0 {
            return if next == 0.0 {
                Direction::Flat
            } else if next > 0.0 {
                Direction::Up
            } else {
                Direction::Down
            };
        }
        let relative = (next - prev) / prev.abs();
        if relative.abs() < self.config.flat_threshold {
            Direction::Flat
        } else if relative > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Per-firm successive estimates inside the trailing window, each
    /// consecutive pair classified up/down/flat. The label follows the
    /// strict-majority direction; none yields `mixed`.
    fn revision_trend(&self, records: &[AnalystRecord], as_of: NaiveDate) -> RevisionTrend {
        let cutoff = as_of
            .checked_sub_days(Days::new(u64::from(self.config.revision_window_days)))
            .unwrap_or(NaiveDate::MIN);
        let mut per_firm: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for record in records {
            if record.date < cutoff || record.date > as_of {
                continue;
            }
            if let Some(estimate) = record.eps_estimate {
                per_firm
                    .entry(record.firm.as_str())
                    .or_default()
                    .push((record.date, estimate));
            }
        }

        let (mut up, mut down, mut flat) = (0usize, 0usize, 0usize);
        for estimates in per_firm.values_mut() {
            // Stable sort: same-date estimates keep their input order.
            estimates.sort_by_key(|(date, _)| *date);
            for pair in estimates.windows(2) {
                match self.classify(pair[0].1, pair[1].1) {
                    Direction::Up => up += 1,
                    Direction::Down => down += 1,
                    Direction::Flat => flat += 1,
                }
            }
        }

        let total = up + down + flat;
        let label = if up * 2 > total {
            TrendLabel::Improving
        } else if down * 2 > total {
            TrendLabel::Deteriorating
        } else if flat * 2 > total {
            TrendLabel::Stable
        } else {
            TrendLabel::Mixed
        };
        RevisionTrend {
            up,
            down,
            flat,
            label,
        }
    }
}

impl AnalystSummarizer for AnalystAggregator {
    fn summarize(
        &self,
        records: &[AnalystRecord],
        as_of: NaiveDate,
    ) -> Result<AnalystSummary, AnalysisError> {
        if records.is_empty() {
            return Err(AnalysisError::EmptyInput("analyst record"));
        }
        let latest = Self::latest_per_firm(records);
        let summary = AnalystSummary {
            firms: latest.len(),
            distribution: Self::distribution(&latest),
            consensus_target: Self::consensus(&latest),
            revision_trend: self.revision_trend(records, as_of),
        };
        let trend = summary.revision_trend;
        debug!(
            firms = summary.firms,
            transitions = trend.up + trend.down + trend.flat,
            label = ?trend.label,
            "aggregated analyst records"
        );
        Ok(summary)
    }
}

impl Default for AnalystAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(firm: &str, d: NaiveDate, rating: Rating) -> AnalystRecord {
        AnalystRecord {
            firm: firm.to_string(),
            date: d,
            rating,
            target_price: None,
            eps_estimate: None,
        }
    }

    fn estimate(firm: &str, d: NaiveDate, eps: f64) -> AnalystRecord {
        AnalystRecord {
            eps_estimate: Some(eps),
            ..record(firm, d, Rating::Hold)
        }
    }

    fn as_of() -> NaiveDate {
        date(2024, 3, 31)
    }

    #[test]
    fn empty_records_rejected() {
        assert_eq!(
            AnalystAggregator::new().summarize(&[], as_of()),
            Err(AnalysisError::EmptyInput("analyst record"))
        );
    }

    #[test]
    fn later_record_supersedes_earlier() {
        let mut old = record("Acme Securities", date(2024, 1, 10), Rating::Sell);
        old.target_price = Some(80.0);
        let mut new = record("Acme Securities", date(2024, 3, 1), Rating::Buy);
        new.target_price = Some(120.0);

        let summary = AnalystAggregator::new()
            .summarize(&[old, new], as_of())
            .unwrap();
        assert_eq!(summary.firms, 1);
        let buy = summary
            .distribution
            .iter()
            .find(|b| b.rating == Rating::Buy)
            .unwrap();
        let sell = summary
            .distribution
            .iter()
            .find(|b| b.rating == Rating::Sell)
            .unwrap();
        assert_eq!(buy.count, 1);
        assert_eq!(sell.count, 0);
        assert!((summary.consensus_target.mean.get().unwrap() - 120.0).abs() < EPS);
    }

    #[test]
    fn same_date_tie_keeps_last_record() {
        let first = record("Acme", date(2024, 3, 1), Rating::Hold);
        let second = record("Acme", date(2024, 3, 1), Rating::Buy);
        let summary = AnalystAggregator::new()
            .summarize(&[first, second], as_of())
            .unwrap();
        let buy = summary
            .distribution
            .iter()
            .find(|b| b.rating == Rating::Buy)
            .unwrap();
        assert_eq!(buy.count, 1);
    }

    #[test]
    fn distribution_counts_and_fractions() {
        let records = vec![
            record("A", date(2024, 3, 1), Rating::StrongBuy),
            record("B", date(2024, 3, 2), Rating::Buy),
            record("C", date(2024, 3, 3), Rating::Buy),
            record("D", date(2024, 3, 4), Rating::Hold),
        ];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        assert_eq!(summary.firms, 4);
        assert_eq!(summary.distribution.len(), 5);
        let buy = summary
            .distribution
            .iter()
            .find(|b| b.rating == Rating::Buy)
            .unwrap();
        assert_eq!(buy.count, 2);
        assert!((buy.fraction - 0.5).abs() < EPS);
        let strong_sell = summary
            .distribution
            .iter()
            .find(|b| b.rating == Rating::StrongSell)
            .unwrap();
        assert_eq!(strong_sell.count, 0);
    }

    #[test]
    fn consensus_statistics() {
        let mut records = Vec::new();
        for (firm, target) in [("A", 100.0), ("B", 110.0), ("C", 120.0), ("D", 130.0)] {
            let mut r = record(firm, date(2024, 3, 1), Rating::Buy);
            r.target_price = Some(target);
            records.push(r);
        }
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        let consensus = summary.consensus_target;
        assert_eq!(consensus.contributors, 4);
        assert!((consensus.mean.get().unwrap() - 115.0).abs() < EPS);
        assert!((consensus.median.get().unwrap() - 115.0).abs() < EPS);
        assert!((consensus.high.get().unwrap() - 130.0).abs() < EPS);
        assert!((consensus.low.get().unwrap() - 100.0).abs() < EPS);
        assert!((consensus.std_dev.get().unwrap() - 12.909944487).abs() < 1e-6);
    }

    #[test]
    fn single_target_has_no_dispersion() {
        let mut r = record("A", date(2024, 3, 1), Rating::Buy);
        r.target_price = Some(100.0);
        let summary = AnalystAggregator::new().summarize(&[r], as_of()).unwrap();
        let consensus = summary.consensus_target;
        assert!((consensus.mean.get().unwrap() - 100.0).abs() < EPS);
        assert_eq!(
            consensus.std_dev.reason,
            Some(GapReason::InsufficientSample)
        );
    }

    #[test]
    fn no_targets_gap_consensus() {
        let records = vec![record("A", date(2024, 3, 1), Rating::Hold)];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        assert_eq!(
            summary.consensus_target.mean.reason,
            Some(GapReason::MissingInput)
        );
        assert_eq!(summary.consensus_target.contributors, 0);
    }

    #[test]
    fn one_up_one_down_is_mixed() {
        let records = vec![
            estimate("A", date(2024, 1, 15), 2.10),
            estimate("A", date(2024, 2, 15), 2.15),
            estimate("A", date(2024, 3, 15), 2.12),
        ];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        let trend = summary.revision_trend;
        assert_eq!((trend.up, trend.down, trend.flat), (1, 1, 0));
        assert_eq!(trend.label, TrendLabel::Mixed);
    }

    #[test]
    fn strict_majority_up_is_improving() {
        let records = vec![
            estimate("A", date(2024, 1, 15), 2.0),
            estimate("A", date(2024, 2, 15), 2.1),
            estimate("A", date(2024, 3, 15), 2.2),
        ];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        assert_eq!(summary.revision_trend.label, TrendLabel::Improving);
    }

    #[test]
    fn sub_threshold_moves_are_stable() {
        let records = vec![
            estimate("A", date(2024, 1, 15), 2.000),
            estimate("A", date(2024, 2, 15), 2.002),
            estimate("A", date(2024, 3, 15), 2.001),
        ];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        let trend = summary.revision_trend;
        assert_eq!(trend.flat, 2);
        assert_eq!(trend.label, TrendLabel::Stable);
    }

    #[test]
    fn estimates_outside_window_ignored() {
        let records = vec![
            estimate("A", date(2023, 11, 1), 1.0), // outside the 90-day window
            estimate("A", date(2024, 2, 15), 2.1),
            estimate("A", date(2024, 3, 15), 2.2),
        ];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        let trend = summary.revision_trend;
        assert_eq!((trend.up, trend.down, trend.flat), (1, 0, 0));
    }

    #[test]
    fn no_transitions_is_mixed() {
        let records = vec![estimate("A", date(2024, 3, 15), 2.1)];
        let summary = AnalystAggregator::new().summarize(&records, as_of()).unwrap();
        assert_eq!(summary.revision_trend.label, TrendLabel::Mixed);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = AnalystConfig {
            revision_window_days: 0,
            ..AnalystConfig::default()
        };
        assert!(matches!(
            AnalystAggregator::with_config(config),
            Err(AnalysisError::InvalidConfig(_))
        ));
        let config = AnalystConfig {
            flat_threshold: -0.1,
            ..AnalystConfig::default()
        };
        assert!(matches!(
            AnalystAggregator::with_config(config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }
}
