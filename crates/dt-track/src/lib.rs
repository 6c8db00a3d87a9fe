//! dt-track: keeps a surrogate model tracking a reference model.
//!
//! Contains:
//! - builder (composition of reference and surrogate under one root)
//! - simulator (horizon error, recalibration trigger, driver hook)
//! - calibrate (calibration window, candidate replay, objective)
//! - config (YAML-loadable tracking settings)
//! - record (per-recalibration results)

pub mod builder;
mod calibrate;
pub mod config;
pub mod error;
pub mod record;
pub mod simulator;

pub use builder::{REFERENCE, SURROGATE, TrackingBuilder};
pub use config::{FailurePolicy, TrackingConfig};
pub use error::{TrackError, TrackResult};
pub use record::CalibrationRecord;
pub use simulator::TrackingSimulator;
