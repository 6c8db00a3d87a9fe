//! The driver contract and its implementation for frozen models.

use dt_model::Model;

use crate::error::{SimError, SimResult};

/// Something the driver can integrate: a derivative function over a flat
/// state vector plus a commit hook for accepted steps.
pub trait Simulated {
    type Error: From<SimError>;

    fn state_count(&self) -> usize;

    fn state_vector(&self) -> Vec<f64>;

    /// Set the start time and commit the first sample. Histories must be
    /// empty.
    fn prepare(&mut self, t0: f64) -> Result<(), Self::Error>;

    fn derivatives(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), Self::Error>;

    /// Commit an accepted step. Returns `true` when the system overrode its
    /// own state, in which case the caller must reload `state_vector()`.
    fn step(&mut self, y: &[f64], t: f64) -> Result<bool, Self::Error>;
}

impl Simulated for Model {
    type Error = SimError;

    fn state_count(&self) -> usize {
        Model::state_count(self)
    }

    fn state_vector(&self) -> Vec<f64> {
        self.flatten_state()
    }

    fn prepare(&mut self, t0: f64) -> SimResult<()> {
        if self.sample_count(self.root())? > 0 {
            return Err(SimError::NotInitialized {
                what: "histories must be empty before a run; call reset()",
            });
        }
        self.set_time(t0);
        self.commit(t0)?;
        Ok(())
    }

    fn derivatives(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> SimResult<()> {
        Model::derivatives(self, t, y, out)?;
        Ok(())
    }

    fn step(&mut self, y: &[f64], t: f64) -> SimResult<bool> {
        self.scatter(y, t)?;
        self.commit(t)?;
        Ok(false)
    }
}
