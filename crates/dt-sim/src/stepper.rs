//! Adaptive Dormand-Prince 4(5) stepping.
//!
//! The stepper knows nothing about commits. After every accepted step it
//! hands the step to `OdeProblem::on_accepted_step`; if the problem answers
//! `StepControl::Resync` the stepper reloads its working state through
//! `OdeProblem::resync` and re-evaluates the derivative there before taking
//! the next step.

use crate::error::SimError;
use crate::options::{SimOptions, check_span};

// Dormand-Prince tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (advancing solution)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 5th minus embedded 4th order
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
/// Exponent of the step controller: 1 / (error order + 1).
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// What the stepper does after an accepted step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepControl {
    /// Keep integrating from the stepper's own state.
    Continue,
    /// Reload the state via `OdeProblem::resync` first.
    Resync,
}

/// One accepted step `(t_prev, y_prev) -> (t, y)` with derivatives at both
/// ends, enough for cubic Hermite interpolation inside the step.
#[derive(Debug)]
pub struct AcceptedStep<'a> {
    pub t_prev: f64,
    pub y_prev: &'a [f64],
    pub f_prev: &'a [f64],
    pub t: f64,
    pub y: &'a [f64],
    pub f: &'a [f64],
    /// True when `t` is the end of the integration interval.
    pub is_final: bool,
}

/// Right-hand side plus accepted-step hook.
pub trait OdeProblem {
    type Error: From<SimError>;

    fn rhs(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error>;

    fn on_accepted_step(&mut self, step: &AcceptedStep<'_>) -> Result<StepControl, Self::Error>;

    /// Write the authoritative state into `y` after a `Resync`.
    fn resync(&mut self, y: &mut [f64]) -> Result<(), Self::Error>;
}

/// Counters for one integration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    pub rhs_evals: usize,
    pub resyncs: usize,
}

fn rms_norm(v: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (v.map(|x| x * x).sum::<f64>() / n as f64).sqrt()
}

fn ensure_finite(v: &[f64], what: &'static str, t: f64) -> Result<(), SimError> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(SimError::NonFinite { what, t })
    }
}

/// Initial step by the Hairer-Norsett-Wanner heuristic.
fn select_initial_step<P: OdeProblem>(
    problem: &mut P,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    span: f64,
    opts: &SimOptions,
    stats: &mut StepStats,
) -> Result<f64, P::Error> {
    let n = y0.len();
    if opts.first_step > 0.0 {
        return Ok(opts.first_step.min(span));
    }
    if n == 0 {
        return Ok(opts.max_step.min(span));
    }
    let scale: Vec<f64> = y0.iter().map(|y| opts.atol + opts.rtol * y.abs()).collect();
    let d0 = rms_norm(y0.iter().zip(&scale).map(|(y, s)| y / s), n);
    let d1 = rms_norm(f0.iter().zip(&scale).map(|(f, s)| f / s), n);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    let h0 = h0.min(span);

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(y, f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; n];
    problem.rhs(t0 + h0, &y1, &mut f1)?;
    stats.rhs_evals += 1;
    let d2 = rms_norm(
        f1.iter()
            .zip(f0)
            .zip(&scale)
            .map(|((a, b), s)| (a - b) / s),
        n,
    ) / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(-ERROR_EXPONENT)
    };
    Ok((100.0 * h0).min(h1).min(opts.max_step).min(span))
}

/// Integrate `problem` from `(t0, y0)` to `t1` with Dormand-Prince 4(5).
///
/// Every step is bounded by `opts.max_step`. Returns the final state.
pub fn dormand_prince<P: OdeProblem>(
    problem: &mut P,
    t0: f64,
    y0: &[f64],
    t1: f64,
    opts: &SimOptions,
) -> Result<(Vec<f64>, StepStats), P::Error> {
    opts.validate()?;
    check_span(t0, t1)?;

    let n = y0.len();
    let mut stats = StepStats::default();
    let mut t = t0;
    let mut y = y0.to_vec();
    let mut f = vec![0.0; n];
    problem.rhs(t, &y, &mut f)?;
    stats.rhs_evals += 1;
    ensure_finite(&f, "derivative", t)?;

    if t1 == t0 {
        return Ok((y, stats));
    }

    let mut h = select_initial_step(problem, t, &y, &f, t1 - t0, opts, &mut stats)?;

    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut k5 = vec![0.0; n];
    let mut k6 = vec![0.0; n];
    let mut k7 = vec![0.0; n];
    let mut y_tmp = vec![0.0; n];
    let mut y_new = vec![0.0; n];

    let mut attempts = 0usize;
    while t < t1 {
        let h_min = opts.h_min.max(10.0 * f64::EPSILON * t.abs());
        let mut rejected = false;

        // retry until the step is accepted
        loop {
            if attempts >= opts.max_steps {
                return Err(SimError::MaxStepsExceeded {
                    max_steps: opts.max_steps,
                    t,
                }
                .into());
            }
            attempts += 1;

            h = h.min(opts.max_step);
            if h < h_min {
                return Err(SimError::StepSizeUnderflow { t, h }.into());
            }
            let (h_step, t_new) = if t + h >= t1 { (t1 - t, t1) } else { (h, t + h) };

            for i in 0..n {
                y_tmp[i] = y[i] + h_step * A21 * f[i];
            }
            problem.rhs(t + C2 * h_step, &y_tmp, &mut k2)?;
            for i in 0..n {
                y_tmp[i] = y[i] + h_step * (A31 * f[i] + A32 * k2[i]);
            }
            problem.rhs(t + C3 * h_step, &y_tmp, &mut k3)?;
            for i in 0..n {
                y_tmp[i] = y[i] + h_step * (A41 * f[i] + A42 * k2[i] + A43 * k3[i]);
            }
            problem.rhs(t + C4 * h_step, &y_tmp, &mut k4)?;
            for i in 0..n {
                y_tmp[i] =
                    y[i] + h_step * (A51 * f[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
            }
            problem.rhs(t + C5 * h_step, &y_tmp, &mut k5)?;
            for i in 0..n {
                y_tmp[i] = y[i]
                    + h_step
                        * (A61 * f[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
            }
            problem.rhs(t_new, &y_tmp, &mut k6)?;
            for i in 0..n {
                y_new[i] = y[i]
                    + h_step * (B1 * f[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
            }
            problem.rhs(t_new, &y_new, &mut k7)?;
            stats.rhs_evals += 6;

            let err = rms_norm(
                (0..n).map(|i| {
                    let e = h_step
                        * (E1 * f[i]
                            + E3 * k3[i]
                            + E4 * k4[i]
                            + E5 * k5[i]
                            + E6 * k6[i]
                            + E7 * k7[i]);
                    e / (opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs()))
                }),
                n,
            );

            if !err.is_finite() {
                ensure_finite(&y_new, "state", t_new)?;
                ensure_finite(&k7, "derivative", t_new)?;
                return Err(SimError::NonFinite {
                    what: "error estimate",
                    t: t_new,
                }
                .into());
            }

            if err <= 1.0 {
                let mut factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                };
                if rejected {
                    factor = factor.min(1.0);
                }

                let step = AcceptedStep {
                    t_prev: t,
                    y_prev: &y,
                    f_prev: &f,
                    t: t_new,
                    y: &y_new,
                    f: &k7,
                    is_final: t_new >= t1,
                };
                let control = problem.on_accepted_step(&step)?;
                stats.accepted += 1;

                t = t_new;
                std::mem::swap(&mut y, &mut y_new);
                std::mem::swap(&mut f, &mut k7);
                if control == StepControl::Resync {
                    problem.resync(&mut y)?;
                    problem.rhs(t, &y, &mut f)?;
                    stats.rhs_evals += 1;
                    stats.resyncs += 1;
                    ensure_finite(&f, "derivative", t)?;
                }
                h *= factor;
                break;
            }

            stats.rejected += 1;
            rejected = true;
            h *= (SAFETY * err.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
        }
    }

    tracing::debug!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        rhs_evals = stats.rhs_evals,
        "dormand-prince finished"
    );
    Ok((y, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y' = -y, recording every accepted step.
    struct Decay {
        accepted: Vec<(f64, f64)>,
        max_h: f64,
    }

    impl OdeProblem for Decay {
        type Error = SimError;

        fn rhs(&mut self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), SimError> {
            dydt[0] = -y[0];
            Ok(())
        }

        fn on_accepted_step(&mut self, step: &AcceptedStep<'_>) -> Result<StepControl, SimError> {
            self.max_h = self.max_h.max(step.t - step.t_prev);
            self.accepted.push((step.t, step.y[0]));
            Ok(StepControl::Continue)
        }

        fn resync(&mut self, _y: &mut [f64]) -> Result<(), SimError> {
            Ok(())
        }
    }

    #[test]
    fn decay_matches_exponential() {
        let mut p = Decay {
            accepted: Vec::new(),
            max_h: 0.0,
        };
        let opts = SimOptions::with_max_step(0.5);
        let (y, stats) = dormand_prince(&mut p, 0.0, &[1.0], 3.0, &opts).unwrap();
        assert!((y[0] - (-3.0f64).exp()).abs() < 1e-6);
        assert!(p.max_h <= 0.5 + 1e-12);
        assert_eq!(p.accepted.last().map(|a| a.0), Some(3.0));
        assert_eq!(stats.accepted, p.accepted.len());
    }

    /// y' = 1, forced back to 0 at every step past t = 1.
    struct Clamp;

    impl OdeProblem for Clamp {
        type Error = SimError;

        fn rhs(&mut self, _t: f64, _y: &[f64], dydt: &mut [f64]) -> Result<(), SimError> {
            dydt[0] = 1.0;
            Ok(())
        }

        fn on_accepted_step(&mut self, step: &AcceptedStep<'_>) -> Result<StepControl, SimError> {
            Ok(if step.t > 1.0 {
                StepControl::Resync
            } else {
                StepControl::Continue
            })
        }

        fn resync(&mut self, y: &mut [f64]) -> Result<(), SimError> {
            y[0] = 0.0;
            Ok(())
        }
    }

    #[test]
    fn resync_replaces_stepper_state() {
        let opts = SimOptions::with_max_step(0.1);
        let (y, stats) = dormand_prince(&mut Clamp, 0.0, &[0.0], 2.0, &opts).unwrap();
        assert_eq!(y[0], 0.0);
        assert!(stats.resyncs > 0);
    }

    struct Blowup;

    impl OdeProblem for Blowup {
        type Error = SimError;

        fn rhs(&mut self, t: f64, _y: &[f64], dydt: &mut [f64]) -> Result<(), SimError> {
            dydt[0] = if t > 0.5 { f64::NAN } else { 1.0 };
            Ok(())
        }

        fn on_accepted_step(&mut self, _: &AcceptedStep<'_>) -> Result<StepControl, SimError> {
            Ok(StepControl::Continue)
        }

        fn resync(&mut self, _y: &mut [f64]) -> Result<(), SimError> {
            Ok(())
        }
    }

    #[test]
    fn nan_derivative_fails_run() {
        let opts = SimOptions::with_max_step(0.1);
        let err = dormand_prince(&mut Blowup, 0.0, &[0.0], 1.0, &opts).unwrap_err();
        assert!(matches!(err, SimError::NonFinite { .. }));
    }

    #[test]
    fn max_steps_is_enforced() {
        let mut p = Decay {
            accepted: Vec::new(),
            max_h: 0.0,
        };
        let opts = SimOptions {
            max_steps: 5,
            ..SimOptions::with_max_step(0.01)
        };
        let err = dormand_prince(&mut p, 0.0, &[1.0], 1.0, &opts).unwrap_err();
        assert!(matches!(err, SimError::MaxStepsExceeded { max_steps: 5, .. }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn steps_are_bounded_and_land_on_end(
                span in 0.1f64..5.0,
                max_step in 0.05f64..1.0,
            ) {
                let mut p = Decay {
                    accepted: Vec::new(),
                    max_h: 0.0,
                };
                let opts = SimOptions::with_max_step(max_step);
                dormand_prince(&mut p, 0.0, &[1.0], span, &opts).unwrap();
                prop_assert!(p.max_h <= max_step * (1.0 + 1e-9));
                prop_assert_eq!(p.accepted.last().map(|a| a.0), Some(span));
                for w in p.accepted.windows(2) {
                    prop_assert!(w[1].0 > w[0].0);
                }
            }
        }
    }
}
