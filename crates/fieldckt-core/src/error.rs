//! Crate-level error type

use crate::config::ConfigError;
use crate::loader::LoadError;
use crate::network::ResponseError;
use crate::ngspice::SimulationError;
use crate::synthesis::SynthesisError;
use crate::validation::ValidationError;
use crate::vector_fitting::FitError;

/// Any error raised by the crate
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, Error>;
