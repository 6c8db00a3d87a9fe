//! Error types for the tracking loop.

use dt_core::CoreError;
use dt_model::ModelError;
use dt_sim::SimError;
use dt_solver::OptimizeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Invalid tracking configuration: {what}")]
    Config { what: &'static str },

    #[error("Calibration at t={t} did not converge after {iterations} iterations (best error {best})")]
    Calibration { t: f64, iterations: usize, best: f64 },

    #[error("Recalibration requested at t={t} while one is running")]
    Reentrant { t: f64 },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Optimizer error: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackResult<T> = Result<T, TrackError>;
