//! Raw standardized mortality ratios.

use disease_map_geography_models::ZeroExpectedPolicy;
use thiserror::Error;

use crate::SpatialUnit;

/// Errors raised while computing standardized ratios.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// A unit has zero expected deaths and the ratio is undefined.
    #[error("Unit '{code}' has E = 0 with O = {observed}; ratio is undefined")]
    DivideByZero {
        /// Municipality code.
        code: String,
        /// Observed count of the unit.
        observed: u64,
    },
}

/// Computes `O / E` for a single unit.
///
/// `0 / 0` is resolved by `policy`; `O / 0` with `O > 0` always fails.
///
/// # Errors
///
/// Returns [`RiskError::DivideByZero`] when the ratio is undefined.
#[allow(clippy::cast_precision_loss)]
pub fn standardized_ratio(
    code: &str,
    observed: u64,
    expected: f64,
    policy: ZeroExpectedPolicy,
) -> Result<f64, RiskError> {
    if expected > 0.0 {
        return Ok(observed as f64 / expected);
    }

    match (observed, policy) {
        (0, ZeroExpectedPolicy::Zero) => Ok(0.0),
        _ => Err(RiskError::DivideByZero {
            code: code.to_string(),
            observed,
        }),
    }
}

/// Computes the RME of every unit, in input order.
///
/// # Errors
///
/// Returns the first [`RiskError`] encountered.
pub fn compute_rme(
    units: &[SpatialUnit],
    policy: ZeroExpectedPolicy,
) -> Result<Vec<f64>, RiskError> {
    let rme = units
        .iter()
        .map(|unit| unit.rme(policy))
        .collect::<Result<Vec<_>, _>>()?;

    let zero_expected = units.iter().filter(|u| u.expected <= 0.0).count();
    if zero_expected > 0 {
        log::warn!("{zero_expected} unit(s) have O = 0 and E = 0; RME set to 0");
    }

    Ok(rme)
}
