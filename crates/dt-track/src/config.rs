//! Tracking settings.

use std::path::Path;

use dt_sim::SimOptions;
use dt_solver::OptimizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{TrackError, TrackResult};

/// What to do when a recalibration does not converge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run with `TrackError::Calibration`.
    #[default]
    Abort,
    /// Keep the current surrogate and wait for the next cooldown.
    SkipCycle,
}

/// Settings of the receding-horizon tracking loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Horizon error above which a recalibration starts
    pub tolerance: f64,
    /// Length of the error and calibration window (seconds)
    pub horizon: f64,
    /// Extra wait after a recalibration, on top of `horizon` (seconds)
    pub cooldown: f64,
    /// Evenly spaced error samples over the window
    pub nsamples: usize,
    /// Step bound of candidate runs (seconds)
    pub time_step: f64,
    /// Optimizer iteration cap; `None` means `200 * parameters`
    pub max_iterations: Option<usize>,
    pub xatol: f64,
    pub fatol: f64,
    pub failure_policy: FailurePolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tolerance: 10.0,
            horizon: 1.0,
            cooldown: 0.0,
            nsamples: 10,
            time_step: 0.1,
            max_iterations: None,
            xatol: 0.01,
            fatol: 1.0,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl TrackingConfig {
    /// Parse and validate a YAML document. Missing fields take defaults.
    pub fn from_yaml_str(content: &str) -> TrackResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> TrackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> TrackResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> TrackResult<()> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.tolerance) {
            return Err(TrackError::Config {
                what: "tolerance must be finite and non-negative",
            });
        }
        if !(self.horizon.is_finite() && self.horizon > 0.0) {
            return Err(TrackError::Config {
                what: "horizon must be finite and positive",
            });
        }
        if !non_negative(self.cooldown) {
            return Err(TrackError::Config {
                what: "cooldown must be finite and non-negative",
            });
        }
        if self.nsamples == 0 {
            return Err(TrackError::Config {
                what: "nsamples must be at least 1",
            });
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(TrackError::Config {
                what: "time_step must be finite and positive",
            });
        }
        if !non_negative(self.xatol) || !non_negative(self.fatol) {
            return Err(TrackError::Config {
                what: "xatol and fatol must be finite and non-negative",
            });
        }
        Ok(())
    }

    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig {
            xatol: self.xatol,
            fatol: self.fatol,
            max_iterations: self.max_iterations,
        }
    }

    /// Options of a candidate run reporting at `sample_times`.
    pub fn candidate_options(&self, sample_times: Vec<f64>) -> SimOptions {
        SimOptions {
            sample_times,
            ..SimOptions::with_max_step(self.time_step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TrackingConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.optimizer().xatol, 0.01);
        assert_eq!(cfg.candidate_options(vec![]).max_step, 0.1);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg = TrackingConfig::from_yaml_str(
            "horizon: 2.0\ncooldown: 1.0\nfailure_policy: skip_cycle\n",
        )
        .unwrap();
        assert_eq!(cfg.horizon, 2.0);
        assert_eq!(cfg.cooldown, 1.0);
        assert_eq!(cfg.nsamples, 10);
        assert_eq!(cfg.failure_policy, FailurePolicy::SkipCycle);
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = TrackingConfig {
            tolerance: 1e-3,
            max_iterations: Some(50),
            ..TrackingConfig::default()
        };
        let text = cfg.to_yaml().unwrap();
        assert_eq!(TrackingConfig::from_yaml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn invalid_values_rejected() {
        for doc in [
            "horizon: 0.0",
            "nsamples: 0",
            "time_step: -0.1",
            "tolerance: -1.0",
            "cooldown: .nan",
        ] {
            assert!(
                matches!(
                    TrackingConfig::from_yaml_str(doc),
                    Err(TrackError::Config { .. })
                ),
                "{doc}"
            );
        }
    }

    #[test]
    fn unknown_policy_is_a_yaml_error() {
        assert!(matches!(
            TrackingConfig::from_yaml_str("failure_policy: retry"),
            Err(TrackError::Yaml(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            TrackingConfig::from_yaml_file("/nonexistent/tracking.yaml"),
            Err(TrackError::Io(_))
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn positive_settings_survive_yaml(
                horizon in 1e-3f64..100.0,
                cooldown in 0.0f64..100.0,
                nsamples in 1usize..500,
                time_step in 1e-4f64..1.0,
            ) {
                let cfg = TrackingConfig {
                    horizon,
                    cooldown,
                    nsamples,
                    time_step,
                    ..TrackingConfig::default()
                };
                let text = cfg.to_yaml().unwrap();
                prop_assert_eq!(TrackingConfig::from_yaml_str(&text).unwrap(), cfg);
            }
        }
    }
}
