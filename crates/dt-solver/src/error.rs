//! Error types for optimizer runs.

use dt_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Objective returned {value} at iteration {iteration}")]
    NonFinite { value: f64, iteration: usize },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;
