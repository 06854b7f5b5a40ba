//! # Statistics Engine
//!
//! Aggregates over a decoded series. `NaN` marks a missing value and is
//! ignored everywhere; an all-missing series yields `NaN` aggregates.

use serde::{Deserialize, Serialize};

use stdfdb_core::types::{FailCount, TestOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Non-missing values
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    /// Population standard deviation
    pub stdev: f64,
    pub cpk: f64,
}

impl Statistics {
    pub fn compute(values: &[f64], low: Option<f64>, high: Option<f64>) -> Self {
        let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return Self {
                count: 0,
                min: f64::NAN,
                max: f64::NAN,
                median: f64::NAN,
                mean: f64::NAN,
                stdev: f64::NAN,
                cpk: f64::NAN,
            };
        }
        present.sort_by(f64::total_cmp);

        let n = present.len();
        let mean = present.iter().sum::<f64>() / n as f64;
        let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let stdev = variance.sqrt();
        let median = if n % 2 == 1 {
            present[n / 2]
        } else {
            (present[n / 2 - 1] + present[n / 2]) / 2.0
        };

        Self {
            count: n,
            min: present[0],
            max: present[n - 1],
            median,
            mean,
            stdev,
            cpk: cpk(mean, stdev, n, low, high),
        }
    }
}

/// Process capability against both limits.
///
/// `NaN` without both limits or without values, `+inf` for zero spread.
pub fn cpk(mean: f64, stdev: f64, count: usize, low: Option<f64>, high: Option<f64>) -> f64 {
    let (Some(low), Some(high)) = (low, high) else {
        return f64::NAN;
    };
    if count == 0 || mean.is_nan() || stdev.is_nan() {
        return f64::NAN;
    }
    if stdev == 0.0 {
        return f64::INFINITY;
    }
    let tolerance = high - low;
    let center = (high + low) / 2.0;
    tolerance / (6.0 * stdev) - (mean - center).abs() / (3.0 * stdev)
}

/// Executions by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub pass: u32,
    pub fail: u32,
    pub indeterminate: u32,
    pub not_tested: u32,
}

impl OutcomeCounts {
    pub fn from_flags(flags: &[i16]) -> Self {
        let mut counts = Self::default();
        for flag in flags {
            match TestOutcome::from_flag(*flag) {
                TestOutcome::Pass => counts.pass += 1,
                TestOutcome::Fail => counts.fail += 1,
                TestOutcome::Indeterminate => counts.indeterminate += 1,
                TestOutcome::NotTested => counts.not_tested += 1,
            }
        }
        counts
    }

    /// Executions that produced a record
    pub fn tested(&self) -> u32 {
        self.pass + self.fail + self.indeterminate
    }
}

/// TSR-declared count when known, otherwise the count derived from flags
pub fn effective_fail_count(declared: FailCount, outcomes: &OutcomeCounts) -> u32 {
    declared.known().unwrap_or(outcomes.fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_aggregates_ignore_nan() {
        let stats = Statistics::compute(&[1.0, f64::NAN, 3.0, 2.0, 4.0], Some(0.0), Some(5.0));
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.stdev - 1.25f64.sqrt()).abs() < 1e-12);
        // T = 5, U = 2.5, mean centered
        assert!((stats.cpk - 5.0 / (6.0 * stats.stdev)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_all_nan() {
        for values in [&[][..], &[f64::NAN, f64::NAN][..]] {
            let stats = Statistics::compute(values, Some(0.0), Some(1.0));
            assert_eq!(stats.count, 0);
            assert!(stats.mean.is_nan());
            assert!(stats.median.is_nan());
            assert!(stats.cpk.is_nan());
        }
    }

    #[test]
    fn test_cpk_degenerate_cases() {
        assert_eq!(Statistics::compute(&[5.0], Some(1.0), Some(10.0)).cpk, f64::INFINITY);
        assert!(Statistics::compute(&[5.0, 6.0], None, Some(10.0)).cpk.is_nan());
        assert!(Statistics::compute(&[5.0, 6.0], Some(1.0), None).cpk.is_nan());
        assert_eq!(cpk(2.0, 1.0, 10, Some(0.0), Some(6.0)), 6.0 / 6.0 - 1.0 / 3.0);
    }

    #[test]
    fn test_outcome_counts_and_fail_count() {
        let outcomes = OutcomeCounts::from_flags(&[0, 0x80, 0xC0, -1, 0x80]);
        assert_eq!(outcomes, OutcomeCounts { pass: 1, fail: 2, indeterminate: 1, not_tested: 1 });
        assert_eq!(outcomes.tested(), 4);
        assert_eq!(effective_fail_count(FailCount::Unknown, &outcomes), 2);
        assert_eq!(effective_fail_count(FailCount::Count(7), &outcomes), 7);
    }
}
