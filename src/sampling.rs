//! Random sampling primitives: multinomial lotteries, binomial trial counts and index sampling.
//!
//! Every function draws from an injected `RngCore`, so a seeded `StdRng` makes any call
//! reproducible.
use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Distribution, Uniform};

use crate::errors::SamplingError;

/// Allowed deviation of a probability vector's sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Cumulative interval boundaries of a probability vector.
///
/// The vector is divided by its sum first and the last boundary is pinned to exactly 1.0,
/// so a uniform draw in [0, 1) always lands in some category.
fn interval_boundaries(probabilities: &[f64]) -> Result<Vec<f64>, SamplingError> {
    if let Some(p) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(SamplingError::InvalidProbabilityVector {
            reason: format!("entry {p} is negative or not finite"),
        });
    }

    let sum: f64 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(SamplingError::InvalidProbabilityVector {
            reason: format!("entries sum to {sum}, expected 1"),
        });
    }

    let mut acc = 0.0;
    let mut intervals: Vec<f64> = probabilities
        .iter()
        .map(|p| {
            acc += p / sum;
            acc
        })
        .collect();

    if let Some(last) = intervals.last_mut() {
        *last = 1.0;
    }

    Ok(intervals)
}

/// Run `amount` independent lotteries of `size` draws each over the outcome categories
/// described by `probabilities`.
///
/// The result has one row per category and one column per lottery; every column sums to
/// `size`. An empty probability vector yields a matrix with no rows.
///
/// A draw maps to the first category whose cumulative boundary lies strictly above it. The
/// visualizer this was extracted from took the first boundary at or above the draw; the two
/// rules differ only on exact ties, where this one never selects a zero-probability category.
///
/// ```
/// use popgen_sims::sampling::rmultinom;
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let counts = rmultinom(2, 3, &[0.5, 0.5], &mut rng).unwrap();
/// assert_eq!(counts.dim(), (2, 2));
/// assert!(counts.columns().into_iter().all(|c| c.sum() == 3));
/// ```
pub fn rmultinom<R: RngCore>(
    amount: usize,
    size: usize,
    probabilities: &[f64],
    rng: &mut R,
) -> Result<Array2<usize>, SamplingError> {
    if probabilities.is_empty() {
        return Ok(Array2::zeros((0, amount)));
    }

    let intervals = interval_boundaries(probabilities)?;
    let mut output = Array2::zeros((probabilities.len(), amount));
    let unit = Uniform::new(0.0, 1.0);

    for lottery in 0..amount {
        for _ in 0..size {
            let value: f64 = unit.sample(rng);
            // first category whose boundary lies above the draw
            let index = intervals.partition_point(|&b| b <= value);
            output[[index, lottery]] += 1;
        }
    }

    Ok(output)
}

/// Count successes among `trial_amount` Bernoulli trials, `observation_amount` times.
///
/// A trial succeeds when a uniform draw in [0, 1) falls strictly below `probability`, so the
/// success rate is exactly `probability`. The visualizer this was extracted from counted a draw
/// equal to `probability` as a success; only an exact tie differs, e.g. a draw of 0 with
/// `probability == 0` is a failure here.
pub fn rbinomial_distribution<R: RngCore>(
    observation_amount: usize,
    trial_amount: usize,
    probability: f64,
    rng: &mut R,
) -> Result<Vec<usize>, SamplingError> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(SamplingError::InvalidProbability(probability));
    }

    let unit = Uniform::new(0.0, 1.0);

    Ok((0..observation_amount)
        .map(|_| {
            (0..trial_amount)
                .filter(|_| unit.sample(rng) < probability)
                .count()
        })
        .collect())
}

/// Draw `sample_amount` indices into `arr`.
///
/// With `replace == true` indices are drawn independently and may repeat (inclusive
/// sampling). With `replace == false` every index appears at most once (exclusive sampling,
/// partial Fisher-Yates). Earlier releases of the visualizer had these two meanings swapped;
/// the flag now follows the conventional reading.
///
/// All indices lie in `0..arr.len()`.
pub fn sample<T, R: RngCore>(
    arr: &[T],
    sample_amount: usize,
    replace: bool,
    rng: &mut R,
) -> Result<Vec<usize>, SamplingError> {
    let available = arr.len();
    if sample_amount == 0 {
        return Ok(vec![]);
    }
    if available == 0 || (!replace && sample_amount > available) {
        return Err(SamplingError::InvalidSampleSize {
            requested: sample_amount,
            available,
        });
    }

    if replace {
        let index = Uniform::new(0, available);
        Ok((0..sample_amount).map(|_| index.sample(rng)).collect())
    } else {
        Ok(rand::seq::index::sample(rng, available, sample_amount).into_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{
        SeedableRng,
        rngs::{StdRng, mock::StepRng},
    };

    use super::*;

    #[test]
    fn multinomial_columns_sum_to_size() {
        let mut rng = StdRng::seed_from_u64(42);
        let counts = rmultinom(25, 40, &[0.2, 0.3, 0.5], &mut rng).unwrap();

        assert_eq!(counts.dim(), (3, 25));
        for column in counts.columns() {
            assert_eq!(column.sum(), 40);
        }
    }

    #[test]
    fn multinomial_single_outcome_takes_every_draw() {
        let mut rng = StdRng::seed_from_u64(1);
        let counts = rmultinom(1, 100, &[1.0], &mut rng).unwrap();
        assert_eq!(counts, Array2::<usize>::from_elem((1, 1), 100));
    }

    #[test]
    fn multinomial_edge_cases() {
        let mut rng = StdRng::seed_from_u64(3);

        let empty = rmultinom(4, 10, &[], &mut rng).unwrap();
        assert_eq!(empty.nrows(), 0);
        assert!(empty.is_empty());

        let zeros = rmultinom(3, 0, &[0.25, 0.75], &mut rng).unwrap();
        assert_eq!(zeros, Array2::<usize>::zeros((2, 3)));
    }

    #[test]
    fn multinomial_absorbs_rounding_drift() {
        let mut rng = StdRng::seed_from_u64(9);
        let third = 1.0 / 3.0;
        let counts = rmultinom(50, 30, &[third, third, third], &mut rng).unwrap();
        assert!(counts.columns().into_iter().all(|c| c.sum() == 30));
    }

    #[test]
    fn multinomial_skips_zero_probability_category() {
        let mut rng = StdRng::seed_from_u64(11);
        let counts = rmultinom(10, 50, &[0.5, 0.0, 0.5], &mut rng).unwrap();
        assert_eq!(counts.row(1).sum(), 0);
    }

    #[test]
    fn multinomial_rejects_bad_vectors() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            rmultinom(1, 10, &[0.5, 0.6], &mut rng),
            Err(SamplingError::InvalidProbabilityVector { .. })
        ));
        assert!(matches!(
            rmultinom(1, 10, &[1.5, -0.5], &mut rng),
            Err(SamplingError::InvalidProbabilityVector { .. })
        ));
        assert!(matches!(
            rmultinom(1, 10, &[f64::NAN, 1.0], &mut rng),
            Err(SamplingError::InvalidProbabilityVector { .. })
        ));
    }

    #[test]
    fn multinomial_frequencies_follow_probabilities() {
        let mut rng = StdRng::seed_from_u64(2024);
        let counts = rmultinom(1, 100_000, &[0.1, 0.6, 0.3], &mut rng).unwrap();
        let share = |i: usize| counts[[i, 0]] as f64 / 100_000.0;

        assert!((share(0) - 0.1).abs() < 0.01);
        assert!((share(1) - 0.6).abs() < 0.01);
        assert!((share(2) - 0.3).abs() < 0.01);
    }

    #[test]
    fn zero_draws_never_pick_zero_probability_outcomes() {
        let mut rng = StepRng::new(0, 0);

        let counts = rmultinom(1, 1, &[0.0, 1.0], &mut rng).unwrap();
        assert_eq!(counts.column(0).to_vec(), vec![0usize, 1]);
        assert_eq!(rbinomial_distribution(1, 1, 0.0, &mut rng).unwrap(), vec![0]);
    }

    #[test]
    fn binomial_counts_stay_within_trials() {
        let mut rng = StdRng::seed_from_u64(17);
        let observations = rbinomial_distribution(200, 12, 0.4, &mut rng).unwrap();

        assert_eq!(observations.len(), 200);
        assert!(observations.iter().all(|&c| c <= 12));
    }

    #[test]
    fn binomial_without_trials_is_all_zero() {
        let mut rng = StdRng::seed_from_u64(17);
        assert_eq!(
            rbinomial_distribution(5, 0, 0.7, &mut rng).unwrap(),
            vec![0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn binomial_impossible_success() {
        let mut rng = StdRng::seed_from_u64(23);
        assert_eq!(
            rbinomial_distribution(3, 1000, 0.0, &mut rng).unwrap(),
            vec![0, 0, 0]
        );
    }

    #[test]
    fn binomial_certain_success() {
        let mut rng = StdRng::seed_from_u64(23);
        assert_eq!(
            rbinomial_distribution(3, 8, 1.0, &mut rng).unwrap(),
            vec![8, 8, 8]
        );
    }

    #[test]
    fn binomial_rejects_out_of_range_probability() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            rbinomial_distribution(1, 1, 1.2, &mut rng),
            Err(SamplingError::InvalidProbability(1.2))
        );
        assert!(rbinomial_distribution(1, 1, f64::NAN, &mut rng).is_err());
    }

    #[test]
    fn exclusive_sample_of_whole_source_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(6);
        let source = [1, 1, 1, 1, 1, 1];
        let picked = sample(&source, 6, false, &mut rng).unwrap();

        let distinct: HashSet<_> = picked.iter().copied().collect();
        assert_eq!(picked.len(), 6);
        assert_eq!(distinct.len(), 6);
        assert!(picked.iter().all(|&i| i < source.len()));
    }

    #[test]
    fn inclusive_sample_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(8);
        let source = ['a', 'b', 'c'];
        let picked = sample(&source, 500, true, &mut rng).unwrap();

        assert_eq!(picked.len(), 500);
        assert!(picked.iter().all(|&i| i < source.len()));
        // 500 draws over 3 slots must repeat
        let distinct: HashSet<_> = picked.iter().collect();
        assert!(distinct.len() <= 3);
    }

    #[test]
    fn sample_size_errors() {
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(
            sample(&[0u8; 4], 5, false, &mut rng),
            Err(SamplingError::InvalidSampleSize {
                requested: 5,
                available: 4
            })
        );
        let empty: [u8; 0] = [];
        assert!(sample(&empty, 1, true, &mut rng).is_err());
        assert_eq!(sample(&empty, 0, false, &mut rng).unwrap(), Vec::<usize>::new());
    }
}
