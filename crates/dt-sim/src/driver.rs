//! Integration driver.
//!
//! The driver walks a `Simulated` system through
//! `Idle -> Initialized -> Stepping -> (Idle | Failed)`:
//! - `prepare(t0)` commits the first sample (`Initialized`)
//! - the configured stepper advances the state (`Stepping`)
//! - accepted steps are committed when at least `max_step` has elapsed since
//!   the previous commit, and the final point is always committed
//! - any error moves the driver to `Failed`; it is never retried

use crate::error::SimError;
use crate::integrator::{ForwardEuler, Rk4, integrate_fixed};
use crate::options::{Method, SimOptions, check_span};
use crate::record::{SimRecord, hermite};
use crate::stepper::{AcceptedStep, OdeProblem, StepControl, dormand_prince};
use crate::system::Simulated;

/// Driver lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Initialized,
    Stepping,
    Failed,
}

/// Relative slack on the commit spacing so that steps of exactly
/// `max_step` are not skipped through rounding.
const THROTTLE_SLACK: f64 = 1e-9;

pub struct Driver<'a, S: Simulated> {
    system: &'a mut S,
    opts: SimOptions,
    phase: Phase,
}

impl<'a, S: Simulated> Driver<'a, S> {
    pub fn new(system: &'a mut S, opts: SimOptions) -> Result<Self, S::Error> {
        opts.validate()?;
        Ok(Self {
            system,
            opts,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn options(&self) -> &SimOptions {
        &self.opts
    }

    /// Simulate from `t0` to `t1`.
    pub fn run(&mut self, t0: f64, t1: f64) -> Result<SimRecord, S::Error> {
        if self.phase == Phase::Failed {
            return Err(SimError::InvalidArg {
                what: "driver failed earlier; start a new one",
            }
            .into());
        }
        match self.run_inner(t0, t1) {
            Ok(record) => {
                self.phase = Phase::Idle;
                Ok(record)
            }
            Err(e) => {
                self.phase = Phase::Failed;
                tracing::warn!(phase = ?self.phase, "simulation failed");
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, t0: f64, t1: f64) -> Result<SimRecord, S::Error> {
        check_span(t0, t1)?;
        self.system.prepare(t0)?;
        self.phase = Phase::Initialized;

        let y0 = self.system.state_vector();
        let mut hook = CommitHook {
            system: &mut *self.system,
            max_step: self.opts.max_step,
            last_commit: t0,
            samples: &self.opts.sample_times,
            next_sample: 0,
            record: SimRecord::default(),
        };
        hook.record_start(t0, &y0);

        self.phase = Phase::Stepping;
        let (_, stats) = match self.opts.method {
            Method::DormandPrince => dormand_prince(&mut hook, t0, &y0, t1, &self.opts)?,
            Method::Rk4 => integrate_fixed(
                &Rk4,
                &mut hook,
                t0,
                &y0,
                t1,
                self.opts.max_step,
                self.opts.max_steps,
            )?,
            Method::ForwardEuler => integrate_fixed(
                &ForwardEuler,
                &mut hook,
                t0,
                &y0,
                t1,
                self.opts.max_step,
                self.opts.max_steps,
            )?,
        };

        let mut record = hook.record;
        record.stats = stats;
        tracing::debug!(
            t0,
            t1,
            rows = record.len(),
            accepted = stats.accepted,
            resyncs = stats.resyncs,
            "run finished"
        );
        Ok(record)
    }
}

/// Run `system` from `t0` to `t1` with a fresh driver.
pub fn simulate<S: Simulated>(
    system: &mut S,
    t0: f64,
    t1: f64,
    opts: &SimOptions,
) -> Result<SimRecord, S::Error> {
    Driver::new(system, opts.clone())?.run(t0, t1)
}

/// Bridges stepper callbacks to the system's commit hook.
struct CommitHook<'s, S: Simulated> {
    system: &'s mut S,
    max_step: f64,
    last_commit: f64,
    samples: &'s [f64],
    next_sample: usize,
    record: SimRecord,
}

impl<S: Simulated> CommitHook<'_, S> {
    fn sampling(&self) -> bool {
        !self.samples.is_empty()
    }

    fn record_start(&mut self, t0: f64, y0: &[f64]) {
        if !self.sampling() {
            self.record.push(t0, y0.to_vec());
            return;
        }
        // sample times before the start map to the initial state
        while self.next_sample < self.samples.len() && self.samples[self.next_sample] <= t0 {
            self.record.push(self.samples[self.next_sample], y0.to_vec());
            self.next_sample += 1;
        }
    }

    fn record_samples(&mut self, step: &AcceptedStep<'_>) {
        while self.next_sample < self.samples.len() {
            let tau = self.samples[self.next_sample];
            if tau > step.t {
                break;
            }
            self.record.push(tau, hermite(step, tau));
            self.next_sample += 1;
        }
    }
}

impl<S: Simulated> OdeProblem for CommitHook<'_, S> {
    type Error = S::Error;

    fn rhs(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), S::Error> {
        self.system.derivatives(t, y, dydt)
    }

    fn on_accepted_step(&mut self, step: &AcceptedStep<'_>) -> Result<StepControl, S::Error> {
        if self.sampling() {
            self.record_samples(step);
        }
        let due = step.t - self.last_commit >= self.max_step * (1.0 - THROTTLE_SLACK);
        if !(due || step.is_final) {
            return Ok(StepControl::Continue);
        }
        let overridden = self.system.step(step.y, step.t)?;
        self.last_commit = step.t;
        if !self.sampling() {
            let row = if overridden {
                self.system.state_vector()
            } else {
                step.y.to_vec()
            };
            self.record.push(step.t, row);
        }
        if overridden {
            tracing::debug!(t = step.t, "state overridden by commit hook");
            Ok(StepControl::Resync)
        } else {
            Ok(StepControl::Continue)
        }
    }

    fn resync(&mut self, y: &mut [f64]) -> Result<(), S::Error> {
        let fresh = self.system.state_vector();
        if fresh.len() != y.len() {
            return Err(SimError::InvalidArg {
                what: "state vector changed length during a run",
            }
            .into());
        }
        y.copy_from_slice(&fresh);
        Ok(())
    }
}
