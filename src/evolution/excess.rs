use super::{TOLERANCE, ZERO_TOLERANCE};
use rand::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExcessError {
    #[error("Excess exceeded total. Total: {total}, Excess: {excess}")]
    ExcessExceedsTotal { total: f64, excess: f64 },
    #[error("Invalid excess {0}, it must be finite and non-negative")]
    InvalidExcess(f64),
    #[error("Invalid value {value} at index {index}, values must be finite and non-negative")]
    InvalidValue { index: usize, value: f64 },
    #[error("Negative value {value} found at index {index} after removing excess {excess}")]
    NegativeResult { index: usize, value: f64, excess: f64 },
    #[error("Excess removal failed: expected a sum of {expected}, got {actual}")]
    SumMismatch { expected: f64, actual: f64 },
}

/// Removes `excess` from `values` so that their sum drops by exactly that amount.
///
/// Values and excess are first normalised by the total `S`, giving `y` and `z`. A random
/// amount `x_k` is then taken from each `y_k`, walking the elements in a shuffled order so
/// that the first element is not always the one that gives up the most. With `X` the amount
/// already removed and `Y` the sum of the elements not visited yet, each draw is confined to
///
/// ```text
/// max(0, z - X - Y) <= x_k <= min(y_k, z - X)
/// ```
///
/// The lower limit makes sure the elements left can still absorb what remains of `z`, the
/// upper limit keeps `x_k` within `y_k` and stops it from overshooting `z`. The last element
/// takes whatever is left, which the limits guarantee it can afford. For example with
/// `[3, 1, 2]` and an excess of 5, at least 2 has to come from the 3 because 1 + 2 < 5.
///
/// # Arguments
/// * `values` - Non-negative values whose sum is too large
/// * `excess` - Amount to remove, `0 <= excess <= sum(values)`
/// * `rng` - Random source
///
/// # Returns
/// * `Result<Vec<f64>, ExcessError>` - `result` with `0 <= result_i <= values_i` and
///   `sum(result) == sum(values) - excess` within tolerance
///
/// # Errors
/// `ExcessExceedsTotal` when `excess > sum(values)` (equality is allowed), and the
/// post-condition errors `NegativeResult` and `SumMismatch` which indicate a logic defect.
pub fn remove_excess<R: Rng + ?Sized>(
    values: &[f64],
    excess: f64,
    rng: &mut R,
) -> Result<Vec<f64>, ExcessError> {
    if let Some((index, &value)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(ExcessError::InvalidValue { index, value });
    }
    if !excess.is_finite() || excess < 0.0 {
        return Err(ExcessError::InvalidExcess(excess));
    }

    let total: f64 = values.iter().sum();
    if excess > total {
        return Err(ExcessError::ExcessExceedsTotal { total, excess });
    }
    if excess == 0.0 {
        return Ok(values.to_vec());
    }

    let n = values.len();
    let z = excess / total;

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let y: Vec<f64> = order.iter().map(|&i| values[i] / total).collect();

    // tail[k] is the sum of y[k..]
    let mut tail = vec![0.0; n + 1];
    for k in (0..n).rev() {
        tail[k] = tail[k + 1] + y[k];
    }

    let mut x = vec![0.0; n];
    let mut removed = 0.0;
    for k in 0..n - 1 {
        let lower = (z - removed - tail[k + 1]).max(0.0);
        let upper = y[k].min(z - removed);
        let draw = if lower < upper {
            rng.random_range(lower..=upper)
        } else {
            // Rounding can leave the interval empty by a hair, the upper limit is the safe pick
            upper.max(0.0)
        };
        x[k] = draw;
        removed += draw;
    }
    x[n - 1] = z - removed;

    let mut taken = vec![0.0; n];
    for (k, &i) in order.iter().enumerate() {
        taken[i] = x[k];
    }

    let scale = total.max(1.0);
    let tolerance = TOLERANCE * scale;
    let zero_tolerance = ZERO_TOLERANCE * scale;

    let mut repaired = Vec::with_capacity(n);
    for (index, (&value, &share)) in values.iter().zip(&taken).enumerate() {
        let reduced = value - share * total;
        if reduced < -tolerance {
            return Err(ExcessError::NegativeResult {
                index,
                value: reduced,
                excess,
            });
        }
        let reduced = reduced.clamp(0.0, value);
        repaired.push(if reduced <= zero_tolerance { 0.0 } else { reduced });
    }

    let expected = total - excess;
    let actual: f64 = repaired.iter().sum();
    if (actual - expected).abs() > tolerance {
        return Err(ExcessError::SumMismatch { expected, actual });
    }

    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_reduces_to_requested_sum() {
        let values = [3.0, 1.0, 2.0];
        for seed in 0..50 {
            let result = remove_excess(&values, 5.0, &mut rng(seed)).unwrap();
            let sum: f64 = result.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum was {}", sum);
            for (r, v) in result.iter().zip(&values) {
                assert!(*r >= 0.0 && r <= v, "{} not in [0, {}]", r, v);
            }
            // At least 2 has to come out of the first element
            assert!(result[0] <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_excess_equal_to_total_is_allowed() {
        let result = remove_excess(&[5.0, 5.0, 5.0], 15.0, &mut rng(1)).unwrap();
        assert_eq!(result, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_excess_above_total_is_fatal() {
        let result = remove_excess(&[5.0, 5.0, 5.0], 15.0 + 1e-9, &mut rng(1));
        assert!(matches!(
            result,
            Err(ExcessError::ExcessExceedsTotal { total, .. }) if total == 15.0
        ));
    }

    #[test]
    fn test_zero_excess_is_a_no_op() {
        let values = [1.5, 0.0, 2.5];
        assert_eq!(remove_excess(&values, 0.0, &mut rng(3)).unwrap(), values);
        assert_eq!(remove_excess(&[0.0, 0.0], 0.0, &mut rng(3)).unwrap(), [0.0, 0.0]);
        assert!(remove_excess(&[], 0.0, &mut rng(3)).unwrap().is_empty());
    }

    #[test]
    fn test_single_element() {
        let result = remove_excess(&[4.0], 1.0, &mut rng(9)).unwrap();
        assert!((result[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            remove_excess(&[1.0, -1.0], 0.5, &mut rng(0)),
            Err(ExcessError::InvalidValue { index: 1, .. })
        ));
        assert!(matches!(
            remove_excess(&[1.0, f64::NAN], 0.5, &mut rng(0)),
            Err(ExcessError::InvalidValue { index: 1, .. })
        ));
        assert!(matches!(
            remove_excess(&[1.0], -0.5, &mut rng(0)),
            Err(ExcessError::InvalidExcess(_))
        ));
    }

    #[test]
    fn test_reduction_is_spread_across_elements() {
        // Over many seeds every element should sometimes give up part of the excess
        let values = [4.0, 4.0, 4.0, 4.0];
        let mut reduced = [false; 4];
        for seed in 0..200 {
            let result = remove_excess(&values, 2.0, &mut rng(seed)).unwrap();
            for (i, r) in result.iter().enumerate() {
                if *r < 4.0 - 1e-9 {
                    reduced[i] = true;
                }
            }
        }
        assert!(reduced.iter().all(|&r| r));
    }

    #[test]
    fn test_same_seed_same_result() {
        let values = [7.0, 0.5, 3.25, 9.0, 1.0];
        let a = remove_excess(&values, 10.0, &mut rng(42)).unwrap();
        let b = remove_excess(&values, 10.0, &mut rng(42)).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_result_is_feasible(
            values in prop::collection::vec(0.0f64..1000.0, 1..40),
            fraction in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let total: f64 = values.iter().sum();
            let excess = fraction * total;
            let result = remove_excess(&values, excess, &mut rng(seed)).unwrap();

            prop_assert_eq!(result.len(), values.len());
            for (r, v) in result.iter().zip(&values) {
                prop_assert!(*r >= 0.0);
                prop_assert!(r <= v);
            }
            let sum: f64 = result.iter().sum();
            prop_assert!((sum - (total - excess)).abs() <= TOLERANCE * total.max(1.0));
        }
    }
}
