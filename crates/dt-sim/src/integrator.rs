//! Fixed-step time integrators.
//!
//! These step with a constant `dt` (the last step is shortened to land on
//! the end time) and report every step through the same
//! `OdeProblem::on_accepted_step` hook as the adaptive stepper.

use crate::error::SimError;
use crate::options::check_span;
use crate::stepper::{AcceptedStep, OdeProblem, StepControl, StepStats};

/// Trait for fixed-step integrators.
pub trait Integrator {
    /// Derivative evaluations per step.
    const STAGES: usize;

    /// Advance `y` at `t` by `dt`, writing the result into `out`.
    fn step<P: OdeProblem>(
        &self,
        problem: &mut P,
        t: f64,
        y: &[f64],
        f: &[f64],
        dt: f64,
        out: &mut [f64],
    ) -> Result<(), P::Error>;
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Copy, Debug)]
pub struct Rk4;

impl Integrator for Rk4 {
    const STAGES: usize = 3;

    fn step<P: OdeProblem>(
        &self,
        problem: &mut P,
        t: f64,
        y: &[f64],
        k1: &[f64],
        dt: f64,
        out: &mut [f64],
    ) -> Result<(), P::Error> {
        let n = y.len();
        let mut tmp = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];

        for i in 0..n {
            tmp[i] = y[i] + 0.5 * dt * k1[i];
        }
        problem.rhs(t + 0.5 * dt, &tmp, &mut k2)?;

        for i in 0..n {
            tmp[i] = y[i] + 0.5 * dt * k2[i];
        }
        problem.rhs(t + 0.5 * dt, &tmp, &mut k3)?;

        for i in 0..n {
            tmp[i] = y[i] + dt * k3[i];
        }
        problem.rhs(t + dt, &tmp, &mut k4)?;

        // y_new = y + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        for i in 0..n {
            out[i] = y[i] + dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        Ok(())
    }
}

/// Forward Euler (explicit, 1st order).
#[derive(Clone, Copy, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    const STAGES: usize = 0;

    fn step<P: OdeProblem>(
        &self,
        _problem: &mut P,
        _t: f64,
        y: &[f64],
        f: &[f64],
        dt: f64,
        out: &mut [f64],
    ) -> Result<(), P::Error> {
        for ((o, yi), fi) in out.iter_mut().zip(y).zip(f) {
            *o = yi + dt * fi;
        }
        Ok(())
    }
}

/// Integrate from `(t0, y0)` to `t1` with constant steps of `dt`.
pub fn integrate_fixed<I: Integrator, P: OdeProblem>(
    integrator: &I,
    problem: &mut P,
    t0: f64,
    y0: &[f64],
    t1: f64,
    dt: f64,
    max_steps: usize,
) -> Result<(Vec<f64>, StepStats), P::Error> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(SimError::InvalidArg {
            what: "dt must be finite and positive",
        }
        .into());
    }
    check_span(t0, t1)?;

    let n = y0.len();
    let mut stats = StepStats::default();
    let mut t = t0;
    let mut y = y0.to_vec();
    let mut f = vec![0.0; n];
    let mut y_new = vec![0.0; n];
    let mut f_new = vec![0.0; n];
    problem.rhs(t, &y, &mut f)?;
    stats.rhs_evals += 1;

    // steps whose remainder is below this are folded into the previous one
    let tiny = 1e-9 * dt;
    while t1 - t > tiny {
        if stats.accepted >= max_steps {
            return Err(SimError::MaxStepsExceeded { max_steps, t }.into());
        }
        let (h, t_new) = if t1 - t <= dt + tiny {
            (t1 - t, t1)
        } else {
            (dt, t + dt)
        };
        integrator.step(problem, t, &y, &f, h, &mut y_new)?;
        problem.rhs(t_new, &y_new, &mut f_new)?;
        stats.rhs_evals += I::STAGES + 1;
        if y_new.iter().chain(&f_new).any(|v| !v.is_finite()) {
            return Err(SimError::NonFinite {
                what: "state",
                t: t_new,
            }
            .into());
        }

        let step = AcceptedStep {
            t_prev: t,
            y_prev: &y,
            f_prev: &f,
            t: t_new,
            y: &y_new,
            f: &f_new,
            is_final: t_new >= t1,
        };
        let control = problem.on_accepted_step(&step)?;
        stats.accepted += 1;

        t = t_new;
        std::mem::swap(&mut y, &mut y_new);
        std::mem::swap(&mut f, &mut f_new);
        if control == StepControl::Resync {
            problem.resync(&mut y)?;
            problem.rhs(t, &y, &mut f)?;
            stats.rhs_evals += 1;
            stats.resyncs += 1;
        }
    }
    Ok((y, stats))
}
