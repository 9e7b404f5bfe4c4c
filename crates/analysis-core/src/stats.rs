//! Rank statistics over plain `f64` samples.
//!
//! The percentile helper is deliberately independent of how a sample was
//! assembled, so the same ranking applies to every multiple and stays
//! testable in isolation. This is rank statistics, not a parametric fit:
//! robust to outliers, no distributional assumptions.

/// Median of a sample. An empty sample yields 0.0; callers guard emptiness
/// where the distinction matters.
pub fn median(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Fraction of sample observations at or below `target`, 0.0 to 1.0.
///
/// Ties count on the higher side (the `<=` rule): ranking the maximum
/// observation against its own sample yields 1.0, the minimum yields `1/n`.
/// An empty sample yields 0.0; callers enforce their own sample floor.
pub fn percentile_rank(target: f64, sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let at_or_below = sample.iter().filter(|&&x| x <= target).count();
    at_or_below as f64 / sample.len() as f64
}
