//! Derivative-free parameter optimization.
//!
//! Provides:
//! - Nelder-Mead downhill simplex minimization
//! - Optimizer configuration and result types

pub mod error;
pub mod nelder_mead;

pub use error::{OptimizeError, OptimizeResult};
pub use nelder_mead::{NelderMeadResult, OptimizerConfig, nelder_mead};
