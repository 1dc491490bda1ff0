use thiserror::Error;

/// Errors raised by the sampling primitives when their inputs are malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingError {
    /// Entries are negative, non-finite, or do not sum to 1.
    #[error("Invalid probability vector: {reason}")]
    InvalidProbabilityVector { reason: String },

    /// A single success probability outside [0, 1].
    #[error("Invalid probability {0}: must lie in [0, 1]")]
    InvalidProbability(f64),

    /// Ragged or otherwise mis-shaped matrix input.
    #[error("Invalid dimension: {reason}")]
    InvalidDimension { reason: String },

    /// More exclusive samples than source entries, or any draw from an empty source.
    #[error("Cannot draw {requested} samples from {available} available indices")]
    InvalidSampleSize { requested: usize, available: usize },
}

/// Errors raised while setting up or running a population model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error("Invalid simulation parameter: {0}")]
    InvalidParameter(String),
}
