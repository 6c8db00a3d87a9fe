//! Forced damped oscillator used as the reference of tracking scenarios.
//!
//! `x' = v`, `v' = force - damping*v - k*x` with `force = sin(t)`. The
//! damping coefficient can jump once at a configured time, which is what a
//! surrogate has to follow by recalibrating.

use dt_model::{ModelBuilder, ModelResult};

/// Coefficients of `forced_plant`.
#[derive(Clone, Copy, Debug)]
pub struct PlantConfig {
    pub k: f64,
    pub damping: f64,
    /// `(time, new damping)`
    pub disturbance: Option<(f64, f64)>,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            k: 1.0,
            damping: 1.0,
            disturbance: None,
        }
    }
}

/// States `x = 0`, `v = 1`; params `k`, `d`; vars `force`, `damping`,
/// `spring`.
pub fn forced_plant(cfg: PlantConfig) -> ModelResult<ModelBuilder> {
    let mut b = ModelBuilder::new();
    let x = b.state("x", 0.0)?;
    let v = b.state("v", 1.0)?;
    let k = b.parameter("k", cfg.k)?;
    let d = b.parameter("d", cfg.damping)?;
    let force = b.var("force", |s| Ok(s.time().sin()))?;
    let damping = b.var("damping", move |s| match cfg.disturbance {
        Some((at, value)) if s.time() >= at => Ok(value),
        _ => s.param(d),
    })?;
    let spring = b.var("spring", move |s| Ok(s.param(k)? * s.value(x)?))?;
    b.der(x, move |s| s.value(v))?;
    b.der(v, move |s| {
        Ok(s.value(force)? - s.value(damping)? * s.value(v)? - s.value(spring)?)
    })?;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_at_rest_position() {
        let mut m = forced_plant(PlantConfig::default()).unwrap().save().unwrap();
        let mut out = [0.0; 2];
        m.derivatives(0.0, &[0.0, 1.0], &mut out).unwrap();
        assert_eq!(out, [1.0, -1.0]);
    }

    #[test]
    fn damping_jumps_at_disturbance() {
        let mut m = forced_plant(PlantConfig {
            disturbance: Some((1.0, 3.0)),
            ..PlantConfig::default()
        })
        .unwrap()
        .save()
        .unwrap();
        let damping = m.find_var("damping").unwrap();
        m.set_time(0.5);
        assert_eq!(m.value(damping).unwrap(), 1.0);
        m.set_time(1.0);
        assert_eq!(m.value(damping).unwrap(), 3.0);
    }

    #[test]
    fn spring_force_follows_position() {
        let mut m = forced_plant(PlantConfig {
            k: 2.0,
            ..PlantConfig::default()
        })
        .unwrap()
        .save()
        .unwrap();
        m.scatter(&[1.5, 0.0], 0.0).unwrap();
        let spring = m.find_var("spring").unwrap();
        assert_eq!(m.value(spring).unwrap(), 3.0);
    }
}
