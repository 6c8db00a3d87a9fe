//! Mass-spring-damper family.
//!
//! The hierarchical and the flat variant describe the same system:
//! `x' = v`, `v' = F - d*v - k*x` with `x(0) = 0`, `v(0) = 1`, `k = d = 1`.

use dt_model::{ModelBuilder, ModelResult};

use crate::signals::{sine_input, time_dep_input};

/// Mass with viscous damping. States `x`, `v`; input `F`; var `friction`.
pub fn mass_damper() -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    let x = b.state("x", 0.0)?;
    let v = b.state("v", 1.0)?;
    let d = b.parameter("d", 1.0)?;
    let friction = b.var("friction", move |s| Ok(s.param(d)? * s.value(v)?))?;
    let f = b.input("F", 0.0)?;
    b.der(x, move |s| s.value(v))?;
    b.der(v, move |s| Ok(s.value(f)? - s.value(friction)?))?;
    Ok(b)
}

/// Linear spring. Input `x`; var `F = -k*x`.
pub fn spring() -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    let x = b.input("x", 0.0)?;
    let k = b.parameter("k", 1.0)?;
    b.var("F", move |s| Ok(-s.param(k)? * s.value(x)?))?;
    Ok(b)
}

/// `md` (mass-damper) and `s` (spring) wired through position and force.
pub fn mass_spring_damper() -> ModelResult<ModelBuilder> {
    let md = mass_damper()?;
    let s = spring()?;
    let md_x = md.find_state("x")?;
    let md_f = md.find_input("F")?;
    let s_x = s.find_input("x")?;
    let s_f = s.find_var("F")?;

    let mut b = ModelBuilder::new();
    b.model("md", md)?;
    b.model("s", s)?;
    b.connect(s_x, md_x)?;
    b.connect(md_f, s_f)?;
    Ok(b)
}

/// Single-node mass-spring-damper with default coefficients.
pub fn mass_spring_damper_flat() -> ModelResult<ModelBuilder> {
    mass_spring_damper_flat_with(1.0, 1.0)
}

/// Single-node mass-spring-damper. States `x`, `v`; input `F`; params `k`,
/// `d`; vars `spring`, `damper`.
pub fn mass_spring_damper_flat_with(k: f64, d: f64) -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    let x = b.state("x", 0.0)?;
    let v = b.state("v", 1.0)?;
    let f = b.input("F", 0.0)?;
    let k = b.parameter("k", k)?;
    let d = b.parameter("d", d)?;
    let spring = b.var("spring", move |s| Ok(s.param(k)? * s.value(x)?))?;
    let damper = b.var("damper", move |s| Ok(s.param(d)? * s.value(v)?))?;
    b.der(x, move |s| s.value(v))?;
    b.der(v, move |s| {
        Ok(s.value(f)? - s.value(damper)? - s.value(spring)?)
    })?;
    Ok(b)
}

/// Flat mass-spring-damper `msd` driven by the step source `u`.
pub fn msd_time_dep() -> ModelResult<ModelBuilder> {
    let msd = mass_spring_damper_flat()?;
    let u = time_dep_input()?;
    let msd_f = msd.find_input("F")?;
    let u_f = u.find_var("F")?;

    let mut b = ModelBuilder::new();
    b.model("msd", msd)?;
    b.model("u", u)?;
    b.connect(msd_f, u_f)?;
    Ok(b)
}

/// Flat mass-spring-damper `msd` driven by `u`, a sine of height 2.
pub fn msd_sine() -> ModelResult<ModelBuilder> {
    let msd = mass_spring_damper_flat()?;
    let u = sine_input(2.0)?;
    let msd_f = msd.find_input("F")?;
    let u_f = u.find_var("F")?;

    let mut b = ModelBuilder::new();
    b.model("msd", msd)?;
    b.model("u", u)?;
    b.connect(msd_f, u_f)?;
    Ok(b)
}

/// Flat variant `m1` next to the hierarchical variant `m2`.
pub fn two_msd_comparison() -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    b.model("m1", mass_spring_damper_flat()?)?;
    b.model("m2", mass_spring_damper()?)?;
    Ok(b)
}
