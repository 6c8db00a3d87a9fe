//! Run configuration.

use dt_core::ensure_finite;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Stepping method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Adaptive Dormand-Prince 4(5) bounded by `max_step` (default).
    #[default]
    DormandPrince,
    /// Classical RK4 with a fixed step of `max_step`.
    Rk4,
    /// Forward Euler with a fixed step of `max_step`.
    ForwardEuler,
}

/// Options for one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Upper bound on every step and the commit spacing. Must be finite.
    pub max_step: f64,
    /// Relative tolerance (adaptive method only).
    pub rtol: f64,
    /// Absolute tolerance (adaptive method only).
    pub atol: f64,
    /// First trial step; 0.0 selects it automatically.
    pub first_step: f64,
    /// Steps smaller than this are an underflow.
    pub h_min: f64,
    /// Safety limit on attempted steps.
    pub max_steps: usize,
    pub method: Method,
    /// Output times. Empty means one record row per commit.
    pub sample_times: Vec<f64>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            max_step: 0.01,
            rtol: 1e-6,
            atol: 1e-9,
            first_step: 0.0,
            h_min: 1e-12,
            max_steps: 1_000_000,
            method: Method::default(),
            sample_times: Vec::new(),
        }
    }
}

impl SimOptions {
    /// Options with the given step bound and defaults elsewhere.
    pub fn with_max_step(max_step: f64) -> Self {
        Self {
            max_step,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.max_step.is_finite() || self.max_step <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "max_step must be finite and positive",
            });
        }
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "rtol must be finite and positive",
            });
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "atol must be finite and positive",
            });
        }
        if !self.first_step.is_finite() || self.first_step < 0.0 {
            return Err(SimError::InvalidArg {
                what: "first_step must be finite and non-negative",
            });
        }
        if !(self.h_min >= 0.0 && self.h_min < self.max_step) {
            return Err(SimError::InvalidArg {
                what: "h_min must be non-negative and below max_step",
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        for &t in &self.sample_times {
            ensure_finite(t, "sample time")?;
        }
        if self.sample_times.windows(2).any(|w| w[1] < w[0]) {
            return Err(SimError::InvalidArg {
                what: "sample_times must be sorted",
            });
        }
        Ok(())
    }
}

/// Integration interval check shared by every stepping method.
pub(crate) fn check_span(t0: f64, t1: f64) -> SimResult<()> {
    ensure_finite(t0, "t0")?;
    ensure_finite(t1, "t1")?;
    if t1 < t0 {
        return Err(SimError::InvalidArg {
            what: "need t0 <= t1",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_step_rejected() {
        for bad in [f64::INFINITY, f64::NAN, 0.0, -1.0] {
            let opts = SimOptions::with_max_step(bad);
            assert!(matches!(
                opts.validate(),
                Err(SimError::InvalidArg { .. })
            ));
        }
        assert!(SimOptions::default().validate().is_ok());
    }

    #[test]
    fn unsorted_samples_rejected() {
        let opts = SimOptions {
            sample_times: vec![0.0, 2.0, 1.0],
            ..SimOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let opts: SimOptions = serde_yaml::from_str("max_step: 0.05\nmethod: rk4\n").unwrap();
        assert_eq!(opts.max_step, 0.05);
        assert_eq!(opts.method, Method::Rk4);
        assert_eq!(opts.rtol, SimOptions::default().rtol);
    }

    #[test]
    fn non_finite_times_are_core_errors() {
        let opts = SimOptions {
            sample_times: vec![0.0, f64::NAN],
            ..SimOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(SimError::Core(dt_core::CoreError::NonFinite { .. }))
        ));
        assert!(matches!(
            check_span(f64::INFINITY, 1.0),
            Err(SimError::Core(dt_core::CoreError::NonFinite { what: "t0", .. }))
        ));
        assert!(matches!(
            check_span(2.0, 1.0),
            Err(SimError::InvalidArg { .. })
        ));
        check_span(0.0, 0.0).unwrap();
    }
}
