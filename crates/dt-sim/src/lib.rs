//! dt-sim: time integration of model trees.
//!
//! Provides:
//! - `Simulated`, the contract between a model and the driver
//! - adaptive Dormand-Prince 4(5) stepping with a mandatory step bound
//! - fixed-step RK4 and forward Euler through the same accepted-step hook
//! - a `Driver` with an observable phase and a throttled commit policy
//! - output at requested sample times by cubic Hermite interpolation

pub mod driver;
pub mod error;
pub mod integrator;
pub mod options;
pub mod record;
pub mod stepper;
pub mod system;

pub use driver::{Driver, Phase, simulate};
pub use error::{SimError, SimResult};
pub use integrator::{ForwardEuler, Integrator, Rk4, integrate_fixed};
pub use options::{Method, SimOptions};
pub use record::{SimRecord, hermite};
pub use stepper::{AcceptedStep, OdeProblem, StepControl, StepStats, dormand_prince};
pub use system::Simulated;
