use std::fmt::Display;

use ndarray::{Array1, Array2};
use rand::RngCore;

use crate::{
    errors::{SamplingError, SimulationError},
    sampling::{PROBABILITY_TOLERANCE, rmultinom},
};

/// Backward migration matrix between demes.
///
/// Row `i` holds, for every deme `j`, the probability that the parent of an offspring
/// born in deme `i` came from deme `j`. Rows sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationMatrix {
    p: Array2<f64>,
}

impl Display for MigrationMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.p)
    }
}

impl MigrationMatrix {
    pub fn new(p: Array2<f64>) -> Result<Self, SimulationError> {
        let (rows, cols) = p.dim();
        if rows != cols {
            return Err(SamplingError::InvalidDimension {
                reason: format!("migration matrix is {rows}x{cols}, expected a square matrix"),
            }
            .into());
        }

        for (i, row) in p.rows().into_iter().enumerate() {
            let sum = row.sum();
            if row.iter().any(|e| !e.is_finite() || *e < 0.0)
                || (sum - 1.0).abs() > PROBABILITY_TOLERANCE
            {
                return Err(SamplingError::InvalidProbabilityVector {
                    reason: format!("migration row {i} is not a probability vector"),
                }
                .into());
            }
        }

        Ok(Self { p })
    }

    /// Island model: a parent is local with probability `1 - migration_rate`, otherwise it
    /// comes from one of the other `n - 1` demes uniformly.
    pub fn island(n: usize, migration_rate: f64) -> Result<Self, SimulationError> {
        if n < 2 {
            return Err(SimulationError::InvalidParameter(format!(
                "island model needs at least 2 demes, got {n}"
            )));
        }
        if !(0.0..=1.0).contains(&migration_rate) {
            return Err(SimulationError::InvalidParameter(format!(
                "migration rate {migration_rate} outside [0, 1]"
            )));
        }

        let off_diagonal = migration_rate / (n as f64 - 1.0);
        let p = Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                1.0 - migration_rate
            } else {
                off_diagonal
            }
        });

        Self::new(p)
    }

    pub fn demes(&self) -> usize {
        self.p.nrows()
    }

    /// Draw the deme of origin for each of `size` parents of deme `i`.
    ///
    /// Entry `j` of the result counts the parents taken from deme `j`; the entries sum to
    /// `size`.
    pub fn parent_counts<R: RngCore>(
        &self,
        i: usize,
        size: usize,
        rng: &mut R,
    ) -> Result<Array1<usize>, SamplingError> {
        let probabilities = self.p.row(i).to_vec();
        let counts = rmultinom(1, size, &probabilities, rng)?;

        Ok(counts.column(0).to_owned())
    }
}
