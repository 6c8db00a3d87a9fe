//! Sources and delays.

use dt_model::{ModelBuilder, ModelResult};

/// Time at which `time_dep_input` steps.
pub const STEP_TIME: f64 = 4.0;
/// Height of the step.
pub const STEP_HEIGHT: f64 = 4.0;
/// Delay of `delay_line`.
pub const DELAY: f64 = 1.0;

/// Var `F`: 0 before `STEP_TIME`, `STEP_HEIGHT` from then on.
pub fn time_dep_input() -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    b.var("F", |s| {
        Ok(if s.time() < STEP_TIME {
            0.0
        } else {
            STEP_HEIGHT
        })
    })?;
    Ok(b)
}

/// Var `F = amplitude * sin(t)`.
pub fn sine_input(amplitude: f64) -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    b.var("F", move |s| Ok(amplitude * s.time().sin()))?;
    Ok(b)
}

/// Input `u`; var `d(t) = u(t - 1)`.
pub fn delay_line() -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    let u = b.input("u", 0.0)?;
    b.var("d", move |s| s.delayed(u, -DELAY))?;
    Ok(b)
}

/// Step source `u` feeding the delay line `d`.
pub fn delay_scenario() -> ModelResult<ModelBuilder> {
    let u = time_dep_input()?;
    let d = delay_line()?;
    let u_f = u.find_var("F")?;
    let d_u = d.find_input("u")?;

    let mut b = ModelBuilder::new();
    b.model("u", u)?;
    b.model("d", d)?;
    b.connect(d_u, u_f)?;
    Ok(b)
}

/// Delay line whose input is bound directly to the ramp `u(t) = t`.
pub fn delay_ramp_scenario() -> ModelResult<ModelBuilder> {
    let d = delay_line()?;
    let d_u = d.find_input("u")?;

    let mut b = ModelBuilder::new();
    b.model("d", d)?;
    b.bind(d_u, |s| Ok(s.time()))?;
    Ok(b)
}
