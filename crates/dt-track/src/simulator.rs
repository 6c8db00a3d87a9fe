//! The tracking simulator.
//!
//! After every committed step the simulator checks whether the surrogate
//! has drifted: once `horizon + cooldown` has passed since the last
//! recalibration and the horizon error exceeds `tolerance`, it fits the
//! free surrogate parameters over the last horizon with Nelder-Mead and
//! overrides the live surrogate's latest sample with the fitted run's end
//! state.

use dt_core::timing::{PhaseStats, Stopwatch};
use dt_model::{CommitMode, Model, NodeRef, ParamRef, Signal, VarRef};
use dt_sim::{SimError, Simulated};
use dt_solver::nelder_mead;
use nalgebra::DVector;

use crate::builder::{MatchedPair, SurrogateFactory};
use crate::calibrate::{Candidate, Window, squared_error};
use crate::config::{FailurePolicy, TrackingConfig};
use crate::error::{TrackError, TrackResult};
use crate::record::CalibrationRecord;

pub struct TrackingSimulator {
    pub(crate) model: Model,
    pub(crate) reference: NodeRef,
    pub(crate) surrogate: NodeRef,
    pub(crate) error: VarRef,
    pub(crate) horizon: ParamRef,
    pub(crate) nsamples: ParamRef,
    pub(crate) pairs: Vec<MatchedPair>,
    /// Calibrated parameters: path relative to the surrogate, live handle.
    pub(crate) free: Vec<(String, ParamRef)>,
    pub(crate) restore: Vec<(String, Signal)>,
    pub(crate) factory: SurrogateFactory,
    pub(crate) config: TrackingConfig,
    pub(crate) last_calibration: f64,
    pub(crate) in_recalibration: bool,
    pub(crate) history: Vec<CalibrationRecord>,
    pub(crate) timing: PhaseStats,
}

impl TrackingSimulator {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn reference(&self) -> NodeRef {
        self.reference
    }

    pub fn surrogate(&self) -> NodeRef {
        self.surrogate
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Replace the settings; `horizon` and `nsamples` also update the root
    /// parameters the `error` var reads.
    pub fn set_config(&mut self, config: TrackingConfig) -> TrackResult<()> {
        config.validate()?;
        self.model.set_param(self.horizon, config.horizon)?;
        self.model.set_param(self.nsamples, config.nsamples as f64)?;
        self.config = config;
        Ok(())
    }

    pub fn recalibration_history(&self) -> &[CalibrationRecord] {
        &self.history
    }

    pub fn last_calibration_time(&self) -> f64 {
        self.last_calibration
    }

    /// Wall time spent recalibrating; empty unless timing is enabled.
    pub fn recalibration_timing(&self) -> PhaseStats {
        self.timing
    }

    /// Live value of a calibrated parameter.
    pub fn parameter(&self, name: &str) -> TrackResult<f64> {
        let p = self
            .free
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| *p)
            .ok_or(TrackError::Config {
                what: "not a calibrated parameter",
            })?;
        Ok(self.model.param(p)?)
    }

    /// Clear histories and recalibrations; state returns to initial values.
    pub fn reset(&mut self) {
        self.model.reset();
        self.history.clear();
        self.timing.reset();
        self.last_calibration = 0.0;
    }

    /// Horizon error at the current time and state.
    pub fn error(&self) -> TrackResult<f64> {
        Ok(self.model.value(self.error)?)
    }

    pub fn should_recalibrate(&self) -> TrackResult<bool> {
        let wait = self.config.horizon + self.config.cooldown;
        if self.model.time() - self.last_calibration <= wait {
            return Ok(false);
        }
        Ok(self.error()? > self.config.tolerance)
    }

    /// Fit the calibrated parameters over the last horizon.
    ///
    /// Returns `true` when the live surrogate state was overridden.
    pub fn recalibrate(&mut self) -> TrackResult<bool> {
        let t = self.model.time();
        if self.in_recalibration {
            return Err(TrackError::Reentrant { t });
        }
        self.in_recalibration = true;
        let watch = Stopwatch::start("recalibration");
        let out = self.recalibrate_at(t);
        if let Some(seconds) = watch.stop() {
            self.timing.record(seconds);
            tracing::debug!(t, seconds, ok = out.is_ok(), "recalibration timed");
        }
        self.in_recalibration = false;
        out
    }

    fn recalibrate_at(&mut self, t: f64) -> TrackResult<bool> {
        let window = Window::capture(&self.model, self.config.horizon, self.config.nsamples)?;
        if window.t1 <= window.t0 {
            return Err(TrackError::Config {
                what: "calibration window is empty",
            });
        }
        let tracked = self
            .pairs
            .iter()
            .map(|pair| window.sample(&self.model, pair.reference))
            .collect::<TrackResult<Vec<_>>>()?;
        let start = self
            .free
            .iter()
            .map(|(_, p)| self.model.param(*p))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            t,
            t0 = window.t0,
            error = self.error()?,
            start = ?start,
            "recalibration started"
        );

        let mut candidate = Candidate::build(self, &window)?;
        let opts = self.config.candidate_options(window.times.clone());
        let result = nelder_mead(
            |x: &DVector<f64>| -> TrackResult<f64> {
                let run = candidate.run(x.as_slice(), &window, &opts)?;
                Ok(squared_error(&tracked, &run.fitted))
            },
            DVector::from_vec(start),
            &self.config.optimizer(),
        )?;

        if !result.converged {
            match self.config.failure_policy {
                FailurePolicy::Abort => {
                    return Err(TrackError::Calibration {
                        t,
                        iterations: result.iterations,
                        best: result.fun,
                    });
                }
                FailurePolicy::SkipCycle => {
                    tracing::warn!(
                        t,
                        iterations = result.iterations,
                        best = result.fun,
                        "recalibration did not converge; skipping cycle"
                    );
                    self.last_calibration = t;
                    return Ok(false);
                }
            }
        }

        let fitted: Vec<f64> = result.x.iter().copied().collect();
        let run = candidate.run(&fitted, &window, &opts)?;
        let (_, present) = run.record.last().ok_or(SimError::NotInitialized {
            what: "candidate run recorded nothing",
        })?;

        for ((_, p), v) in self.free.iter().zip(&fitted) {
            self.model.set_param(*p, *v)?;
        }
        let range = self.model.state_range(self.surrogate)?;
        let mut y = self.model.flatten_state();
        y[range].copy_from_slice(present);
        self.model.scatter(&y, t)?;
        self.model.commit_node(self.surrogate, CommitMode::Override)?;

        let parameters: Vec<(String, f64)> = self
            .free
            .iter()
            .map(|(name, _)| name.clone())
            .zip(fitted.iter().copied())
            .collect();
        tracing::info!(
            t,
            parameters = ?parameters,
            error = result.fun,
            iterations = result.iterations,
            replayed = candidate.replayed_inputs(),
            "recalibration finished"
        );
        self.history.push(CalibrationRecord {
            parameters,
            t0: window.t0,
            t1: window.t1,
            times: window.times,
            tracked,
            fitted: run.fitted,
            states: run.record.x,
            error: result.fun,
            iterations: result.iterations,
        });
        self.last_calibration = t;
        Ok(true)
    }
}

impl Simulated for TrackingSimulator {
    type Error = TrackError;

    fn state_count(&self) -> usize {
        self.model.state_count()
    }

    fn state_vector(&self) -> Vec<f64> {
        self.model.flatten_state()
    }

    fn prepare(&mut self, t0: f64) -> TrackResult<()> {
        Simulated::prepare(&mut self.model, t0)?;
        self.last_calibration = t0;
        Ok(())
    }

    fn derivatives(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> TrackResult<()> {
        self.model.derivatives(t, y, out)?;
        Ok(())
    }

    /// Commit, then recalibrate when due.
    fn step(&mut self, y: &[f64], t: f64) -> TrackResult<bool> {
        Simulated::step(&mut self.model, y, t)?;
        if self.should_recalibrate()? {
            return self.recalibrate();
        }
        Ok(false)
    }
}
