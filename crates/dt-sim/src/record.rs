//! Run output.

use crate::stepper::{AcceptedStep, StepStats};

/// Record of one simulation run.
#[derive(Clone, Debug, Default)]
pub struct SimRecord {
    /// Time points (seconds)
    pub t: Vec<f64>,
    /// Flat state at each time point
    pub x: Vec<Vec<f64>>,
    pub stats: StepStats,
}

impl SimRecord {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn push(&mut self, t: f64, x: Vec<f64>) {
        self.t.push(t);
        self.x.push(x);
    }

    pub fn last(&self) -> Option<(f64, &[f64])> {
        Some((*self.t.last()?, self.x.last()?.as_slice()))
    }
}

/// Cubic Hermite interpolation of an accepted step at `tau`.
pub fn hermite(step: &AcceptedStep<'_>, tau: f64) -> Vec<f64> {
    let h = step.t - step.t_prev;
    if h <= 0.0 {
        return step.y.to_vec();
    }
    let s = (tau - step.t_prev) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    (0..step.y.len())
        .map(|i| {
            h00 * step.y_prev[i]
                + h10 * h * step.f_prev[i]
                + h01 * step.y[i]
                + h11 * h * step.f[i]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hermite_is_exact_for_cubics() {
        // y = t^3 on [1, 2]
        let step = AcceptedStep {
            t_prev: 1.0,
            y_prev: &[1.0],
            f_prev: &[3.0],
            t: 2.0,
            y: &[8.0],
            f: &[12.0],
            is_final: false,
        };
        for tau in [1.0, 1.25, 1.5, 1.9, 2.0] {
            let y = hermite(&step, tau);
            assert!((y[0] - tau * tau * tau).abs() < 1e-12);
        }
    }
}
