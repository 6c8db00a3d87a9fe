//! dt-core: shared foundation for the dtwin crates.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers + sampling grids)
//! - ids (process-unique handle keys)
//! - timing (wall-clock timers for recalibration bookkeeping)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
