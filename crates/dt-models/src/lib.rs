//! dt-models: reference model constructors.
//!
//! Every constructor returns a `ModelBuilder` with all declarations and
//! wiring done, ready to be attached as a child or frozen with `save()`.
//!
//! - msd (mass-damper, spring, hierarchical and flat mass-spring-damper)
//! - signals (step and sine sources, a one-second delay line)
//! - plant (forced, damped oscillator used as a tracking reference)

pub mod msd;
pub mod plant;
pub mod signals;

pub use msd::{
    mass_damper, mass_spring_damper, mass_spring_damper_flat, mass_spring_damper_flat_with,
    msd_sine, msd_time_dep, spring, two_msd_comparison,
};
pub use plant::{PlantConfig, forced_plant};
pub use signals::{
    delay_line, delay_ramp_scenario, delay_scenario, sine_input, time_dep_input,
};
