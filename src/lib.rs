pub mod errors;
pub mod matrix;
pub mod migration;
pub mod sampling;
pub mod simulations;
pub mod trajectory;
pub mod visualizations;

pub mod prelude {
    pub use super::errors::{SamplingError, SimulationError};
    pub use super::matrix::{create_x_array, create_x_array_to, transpose_matrix};
    pub use super::sampling::{rbinomial_distribution, rmultinom, sample};
    pub use super::simulations::{Fitness, Model, Parameters, SimulationRun};
    pub use super::trajectory::Trajectories;
}
