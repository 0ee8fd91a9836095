#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Empirical quantile classes for choropleth display.
//!
//! Cut points are the empirical quantiles of the values being classified
//! (linear interpolation between order statistics), so class boundaries
//! are recomputed for every mapped variable. Intervals are right-closed,
//! with the lowest one closed on both ends:
//!
//! ```text
//! [q0, q1]  (q1, q2]  ...  (q(k-1), qk]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while classifying values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    /// Breakpoints are not a strictly increasing sequence from 0 to 1.
    #[error("Invalid quantile breakpoints: {message}")]
    InvalidBreakpoints {
        /// Description of what is wrong.
        message: String,
    },

    /// There are no values to classify.
    #[error("Cannot classify an empty set of values")]
    EmptyInput,

    /// A value is NaN or infinite.
    #[error("Value {index} is not finite: {value}")]
    NonFinite {
        /// Position of the value.
        index: usize,
        /// The offending value.
        value: f64,
    },
}

/// Validated quantile breakpoints: strictly increasing, first 0, last 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Breakpoints(Vec<f64>);

impl Breakpoints {
    /// Validates `probs`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidBreakpoints`] unless there are at
    /// least two values, the first is 0, the last is 1, and each value is
    /// strictly greater than the one before.
    pub fn new(probs: Vec<f64>) -> Result<Self, ClassifyError> {
        let invalid = |message: &str| ClassifyError::InvalidBreakpoints {
            message: message.to_string(),
        };

        if probs.len() < 2 {
            return Err(invalid("need at least two breakpoints"));
        }
        if probs.first().is_none_or(|p| *p != 0.0) {
            return Err(invalid("first breakpoint must be 0"));
        }
        if probs.last().is_none_or(|p| *p != 1.0) {
            return Err(invalid("last breakpoint must be 1"));
        }
        if probs.windows(2).any(|w| w[0].partial_cmp(&w[1]) != Some(std::cmp::Ordering::Less)) {
            return Err(invalid("breakpoints must be strictly increasing"));
        }

        Ok(Self(probs))
    }

    /// `n` equal-probability classes (`0, 1/n, ..., 1`).
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidBreakpoints`] if `n` is 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn equal(n: usize) -> Result<Self, ClassifyError> {
        if n == 0 {
            return Err(ClassifyError::InvalidBreakpoints {
                message: "need at least one class".to_string(),
            });
        }
        let mut probs: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        probs.push(1.0);
        Self::new(probs)
    }

    /// The probabilities.
    #[must_use]
    pub fn probs(&self) -> &[f64] {
        &self.0
    }

    /// Number of classes (one fewer than breakpoints).
    #[must_use]
    pub fn classes(&self) -> usize {
        self.0.len() - 1
    }
}

impl TryFrom<Vec<f64>> for Breakpoints {
    type Error = ClassifyError;

    fn try_from(probs: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(probs)
    }
}

impl From<Breakpoints> for Vec<f64> {
    fn from(breakpoints: Breakpoints) -> Self {
        breakpoints.0
    }
}

/// Empirical quantile of ascending-sorted `sorted` at probability `p`,
/// interpolating linearly between order statistics.
///
/// # Panics
///
/// Panics if `sorted` is empty.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Bin of `value` given ascending `cuts`.
///
/// The first cut not below `value` bounds its bin from above, so a value
/// equal to an interior cut lands in the lower bin. Values at or below the
/// first cut go to bin 0, values above the last cut to the last bin.
#[must_use]
pub fn bin_index(cuts: &[f64], value: f64) -> usize {
    let last = cuts.len().saturating_sub(2);
    cuts.partition_point(|c| *c < value)
        .saturating_sub(1)
        .min(last)
}

/// Result of classifying a set of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Quantile cut points, one per breakpoint.
    pub cuts: Vec<f64>,
    /// Bin of every input value, in input order.
    pub bins: Vec<usize>,
    /// Number of values in each bin.
    pub counts: Vec<usize>,
}

impl Classification {
    /// Number of bins.
    #[must_use]
    pub fn classes(&self) -> usize {
        self.cuts.len().saturating_sub(1)
    }

    /// Interval label of every bin, e.g. `[0.52, 0.81]` and `(0.81, 1.02]`.
    #[must_use]
    pub fn labels(&self, precision: usize) -> Vec<String> {
        self.cuts
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let open = if i == 0 { '[' } else { '(' };
                format!("{open}{:.precision$}, {:.precision$}]", w[0], w[1])
            })
            .collect()
    }
}

/// Classifies `values` into quantile classes.
///
/// # Errors
///
/// Returns [`ClassifyError::EmptyInput`] for no values or
/// [`ClassifyError::NonFinite`] if any value is NaN or infinite.
pub fn classify(values: &[f64], breakpoints: &Breakpoints) -> Result<Classification, ClassifyError> {
    if values.is_empty() {
        return Err(ClassifyError::EmptyInput);
    }
    if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(ClassifyError::NonFinite { index, value });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let cuts: Vec<f64> = breakpoints
        .probs()
        .iter()
        .map(|&p| quantile(&sorted, p))
        .collect();

    let bins: Vec<usize> = values.iter().map(|&v| bin_index(&cuts, v)).collect();

    let mut counts = vec![0; breakpoints.classes()];
    for &bin in &bins {
        counts[bin] += 1;
    }

    Ok(Classification { cuts, bins, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quintiles() -> Breakpoints {
        Breakpoints::new(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]).unwrap()
    }

    #[test]
    fn interpolated_quantiles() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 1.0) - 4.0).abs() < 1e-12);
        assert!((quantile(&sorted, 1.0 / 3.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn interior_cut_goes_to_lower_bin() {
        // Cuts at 1, 2.5, 4 for quartile-free halves.
        let values = [1.0, 2.0, 3.0, 4.0];
        let halves = Breakpoints::new(vec![0.0, 0.5, 1.0]).unwrap();
        let c = classify(&values, &halves).unwrap();
        assert_eq!(c.bins, vec![0, 0, 1, 1]);

        assert_eq!(bin_index(&[1.0, 2.0, 4.0], 2.0), 0);
        assert_eq!(bin_index(&[1.0, 2.0, 4.0], 2.000_1), 1);
    }

    #[test]
    fn extremes_go_to_first_and_last_bins() {
        let values: Vec<f64> = (0..50).map(f64::from).collect();
        let c = classify(&values, &quintiles()).unwrap();

        let min = c.cuts[0];
        let max = *c.cuts.last().unwrap();
        assert_eq!(bin_index(&c.cuts, min), 0);
        assert_eq!(bin_index(&c.cuts, min - 10.0), 0);
        assert_eq!(bin_index(&c.cuts, max), 4);
        assert_eq!(bin_index(&c.cuts, max + 10.0), 4);
        assert_eq!(c.counts.iter().sum::<usize>(), 50);
    }

    #[test]
    fn bins_are_monotonic() {
        let values: Vec<f64> = (0..97).map(|i| f64::from(i * 37 % 97) / 10.0).collect();
        let c = classify(&values, &quintiles()).unwrap();

        let mut probe: Vec<f64> = values.clone();
        probe.sort_by(f64::total_cmp);
        let bins: Vec<usize> = probe.iter().map(|&v| bin_index(&c.cuts, v)).collect();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn heavy_ties_yield_empty_bins_not_errors() {
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0];
        let c = classify(&values, &quintiles()).unwrap();

        assert_eq!(c.cuts[0], c.cuts[1]);
        assert_eq!(c.classes(), 5);
        assert_eq!(c.counts.iter().sum::<usize>(), values.len());
        assert!(c.bins[..7].iter().all(|&b| b == 0));
        assert!(c.counts.contains(&0));
    }

    #[test]
    fn constant_values_fall_in_first_bin() {
        let c = classify(&[2.0; 5], &quintiles()).unwrap();
        assert_eq!(c.bins, vec![0; 5]);
    }

    #[test]
    fn labels_use_interval_notation() {
        let c = classify(&[1.0, 2.0, 3.0, 4.0], &Breakpoints::new(vec![0.0, 0.5, 1.0]).unwrap())
            .unwrap();
        assert_eq!(c.labels(2), vec!["[1.00, 2.50]", "(2.50, 4.00]"]);
    }

    #[test]
    fn invalid_breakpoints() {
        for probs in [
            vec![0.0],
            vec![0.1, 1.0],
            vec![0.0, 0.9],
            vec![0.0, 0.5, 0.5, 1.0],
            vec![0.0, 0.6, 0.4, 1.0],
            vec![0.0, f64::NAN, 1.0],
        ] {
            assert!(
                matches!(
                    Breakpoints::new(probs.clone()),
                    Err(ClassifyError::InvalidBreakpoints { .. })
                ),
                "accepted {probs:?}"
            );
        }
    }

    #[test]
    fn equal_breakpoints() {
        let b = Breakpoints::equal(4).unwrap();
        assert_eq!(b.probs(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(b.classes(), 4);
        assert!(Breakpoints::equal(0).is_err());
    }

    #[test]
    fn bad_values() {
        assert_eq!(classify(&[], &quintiles()), Err(ClassifyError::EmptyInput));
        assert!(matches!(
            classify(&[1.0, f64::NAN], &quintiles()),
            Err(ClassifyError::NonFinite { index: 1, .. })
        ));
    }
}
