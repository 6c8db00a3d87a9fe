//! Error types for integration runs.

use thiserror::Error;

/// Errors encountered while driving a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Not initialized: {what}")]
    NotInitialized { what: &'static str },

    #[error("Step size underflow at t={t} (h={h})")]
    StepSizeUnderflow { t: f64, h: f64 },

    #[error("Non-finite {what} at t={t}")]
    NonFinite { what: &'static str, t: f64 },

    #[error("Exceeded max_steps={max_steps} at t={t}")]
    MaxStepsExceeded { max_steps: usize, t: f64 },

    #[error("Model error: {0}")]
    Model(#[from] dt_model::ModelError),

    #[error(transparent)]
    Core(#[from] dt_core::CoreError),
}

pub type SimResult<T> = Result<T, SimError>;
