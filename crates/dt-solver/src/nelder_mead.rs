//! Nelder-Mead downhill simplex.
//!
//! Initial simplex: `x0` plus one vertex per coordinate, nudged by 5%
//! (or by `0.00025` when the coordinate is zero). Reflection, expansion,
//! contraction and shrink coefficients are 1, 2, 1/2, 1/2. The run converges
//! when every vertex lies within `xatol` of the best one (per coordinate)
//! and every vertex value within `fatol` of the best value.

use crate::error::OptimizeError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

const NONZERO_DELTA: f64 = 0.05;
const ZERO_DELTA: f64 = 0.00025;

/// Nelder-Mead configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Absolute spread of the simplex vertices accepted as converged
    pub xatol: f64,
    /// Absolute spread of the vertex values accepted as converged
    pub fatol: f64,
    /// Iteration cap; `None` means `200 * dimension`
    pub max_iterations: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            xatol: 1e-4,
            fatol: 1e-4,
            max_iterations: None,
        }
    }
}

impl OptimizerConfig {
    fn iteration_cap(&self, dim: usize) -> usize {
        self.max_iterations.unwrap_or(200 * dim)
    }

    fn validate(&self) -> Result<(), OptimizeError> {
        if !(self.xatol.is_finite() && self.xatol >= 0.0) {
            return Err(OptimizeError::InvalidArg {
                what: "xatol must be finite and non-negative",
            });
        }
        if !(self.fatol.is_finite() && self.fatol >= 0.0) {
            return Err(OptimizeError::InvalidArg {
                what: "fatol must be finite and non-negative",
            });
        }
        Ok(())
    }
}

/// Nelder-Mead result.
#[derive(Clone, Debug)]
pub struct NelderMeadResult {
    /// Best vertex
    pub x: DVector<f64>,
    /// Objective at `x`
    pub fun: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Objective evaluations performed
    pub evaluations: usize,
    /// True when the tolerances were met before the iteration cap
    pub converged: bool,
    /// Best value after each iteration
    pub history: Vec<f64>,
}

struct Vertex {
    x: DVector<f64>,
    f: f64,
}

struct Counted<F> {
    objective: F,
    evaluations: usize,
}

impl<F> Counted<F> {
    fn eval<E>(&mut self, x: &DVector<f64>, iteration: usize) -> Result<f64, E>
    where
        F: FnMut(&DVector<f64>) -> Result<f64, E>,
        E: From<OptimizeError>,
    {
        let f = (self.objective)(x)?;
        self.evaluations += 1;
        if f.is_nan() {
            return Err(OptimizeError::NonFinite {
                value: f,
                iteration,
            }
            .into());
        }
        Ok(f)
    }
}

/// Minimize `objective` starting from `x0`.
///
/// The objective may fail with its own error type; a NaN value is reported
/// as `OptimizeError::NonFinite`. `+inf` is allowed and simply never wins.
pub fn nelder_mead<F, E>(
    objective: F,
    x0: DVector<f64>,
    config: &OptimizerConfig,
) -> Result<NelderMeadResult, E>
where
    F: FnMut(&DVector<f64>) -> Result<f64, E>,
    E: From<OptimizeError>,
{
    config.validate()?;
    let n = x0.len();
    if n == 0 {
        return Err(OptimizeError::InvalidArg {
            what: "x0 must not be empty",
        }
        .into());
    }
    for &v in x0.iter() {
        dt_core::ensure_finite(v, "x0").map_err(OptimizeError::from)?;
    }

    let max_iterations = config.iteration_cap(n);
    let mut counted = Counted {
        objective,
        evaluations: 0,
    };

    let mut simplex = Vec::with_capacity(n + 1);
    let f0 = counted.eval(&x0, 0)?;
    simplex.push(Vertex { x: x0.clone(), f: f0 });
    for k in 0..n {
        let mut y = x0.clone();
        y[k] = if y[k] != 0.0 {
            (1.0 + NONZERO_DELTA) * y[k]
        } else {
            ZERO_DELTA
        };
        let f = counted.eval(&y, 0)?;
        simplex.push(Vertex { x: y, f });
    }
    sort(&mut simplex);

    let mut history = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        if within_tolerance(&simplex, config) {
            converged = true;
            break;
        }

        let worst = &simplex[n];
        let mut centroid: DVector<f64> = DVector::zeros(n);
        for v in &simplex[..n] {
            centroid += &v.x;
        }
        centroid /= n as f64;

        let xr = (1.0 + RHO) * &centroid - RHO * &worst.x;
        let fr = counted.eval(&xr, iterations)?;
        let mut shrink = false;
        let step;

        if fr < simplex[0].f {
            let xe = (1.0 + RHO * CHI) * &centroid - RHO * CHI * &worst.x;
            let fe = counted.eval(&xe, iterations)?;
            if fe < fr {
                simplex[n] = Vertex { x: xe, f: fe };
                step = "expand";
            } else {
                simplex[n] = Vertex { x: xr, f: fr };
                step = "reflect";
            }
        } else if fr < simplex[n - 1].f {
            simplex[n] = Vertex { x: xr, f: fr };
            step = "reflect";
        } else if fr < simplex[n].f {
            let xc = (1.0 + PSI * RHO) * &centroid - PSI * RHO * &simplex[n].x;
            let fc = counted.eval(&xc, iterations)?;
            if fc <= fr {
                simplex[n] = Vertex { x: xc, f: fc };
                step = "contract outside";
            } else {
                shrink = true;
                step = "shrink";
            }
        } else {
            let xcc = (1.0 - PSI) * &centroid + PSI * &simplex[n].x;
            let fcc = counted.eval(&xcc, iterations)?;
            if fcc < simplex[n].f {
                simplex[n] = Vertex { x: xcc, f: fcc };
                step = "contract inside";
            } else {
                shrink = true;
                step = "shrink";
            }
        }

        if shrink {
            let best = simplex[0].x.clone();
            for v in simplex.iter_mut().skip(1) {
                v.x = &best + SIGMA * (&v.x - &best);
                v.f = counted.eval(&v.x, iterations)?;
            }
        }

        iterations += 1;
        sort(&mut simplex);
        history.push(simplex[0].f);
        tracing::debug!(iteration = iterations, best = simplex[0].f, step, "nelder-mead");
    }

    if !converged && within_tolerance(&simplex, config) {
        converged = true;
    }
    if !converged {
        tracing::warn!(iterations, best = simplex[0].f, "nelder-mead hit iteration cap");
    }

    let best = simplex.swap_remove(0);
    Ok(NelderMeadResult {
        x: best.x,
        fun: best.f,
        iterations,
        evaluations: counted.evaluations,
        converged,
        history,
    })
}

fn sort(simplex: &mut [Vertex]) {
    simplex.sort_by(|a, b| a.f.total_cmp(&b.f));
}

fn within_tolerance(simplex: &[Vertex], config: &OptimizerConfig) -> bool {
    let best = &simplex[0];
    simplex[1..].iter().all(|v| {
        (&v.x - &best.x).amax() <= config.xatol && (v.f - best.f).abs() <= config.fatol
    })
}
