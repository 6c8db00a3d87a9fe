//! Results of one recalibration.

use serde::{Deserialize, Serialize};

/// What a successful recalibration fitted and over which window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Fitted parameters, paths relative to the surrogate
    pub parameters: Vec<(String, f64)>,
    /// Window start (snapped to a recorded timestamp)
    pub t0: f64,
    /// Window end, the time of the recalibration
    pub t1: f64,
    /// Sample times inside the window
    pub times: Vec<f64>,
    /// Reference values per matched pair at `times`
    pub tracked: Vec<Vec<f64>>,
    /// Fitted surrogate values per matched pair at `times`
    pub fitted: Vec<Vec<f64>>,
    /// Fitted surrogate state at `times`, one row per sample
    pub states: Vec<Vec<f64>>,
    /// Objective at the fitted parameters
    pub error: f64,
    pub iterations: usize,
}

impl CalibrationRecord {
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// State the live surrogate was overridden with.
    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let rec = CalibrationRecord {
            parameters: vec![("d".into(), 1.5), ("k".into(), 0.5)],
            t0: 1.0,
            t1: 3.0,
            times: vec![1.0, 3.0],
            tracked: vec![vec![0.0, 1.0]],
            fitted: vec![vec![0.0, 1.0]],
            states: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
            error: 0.0,
            iterations: 4,
        };
        assert_eq!(rec.parameter("k"), Some(0.5));
        assert_eq!(rec.parameter("x"), None);
        assert_eq!(rec.final_state(), Some(&[1.0, 0.0][..]));
    }
}
