//! Formula evaluation context.

use std::cell::Cell;
use std::rc::Rc;

use dt_core::is_zero;

use crate::error::{ModelError, ModelResult};
use crate::handle::{ParamRef, Signal};
use crate::model::Model;

/// Backing function of a var, a derivative or a wired input.
pub type Formula = Rc<dyn Fn(&Scope<'_>) -> ModelResult<f64>>;

/// Nesting limit for formula evaluation; deeper chains are reported as an
/// algebraic loop.
const MAX_DEPTH: usize = 256;

pub(crate) fn formula<F>(f: F) -> Formula
where
    F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
{
    Rc::new(f)
}

/// Read-only view of a frozen model handed to formulas.
///
/// Every read resolves against the model's current time and state; a read
/// of a var or input evaluates its formula on demand.
pub struct Scope<'a> {
    model: &'a Model,
    depth: Cell<usize>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(model: &'a Model) -> Self {
        Self {
            model,
            depth: Cell::new(0),
        }
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.model.time()
    }

    /// Live value of a signal.
    pub fn value(&self, signal: impl Into<Signal>) -> ModelResult<f64> {
        let idx = self.model.signal_index(signal.into())?;
        self.eval(idx)
    }

    /// Value of a signal `d` time units ago (`d <= 0`).
    ///
    /// A zero delay reads the live value without touching the history.
    pub fn delayed(&self, signal: impl Into<Signal>, d: f64) -> ModelResult<f64> {
        let idx = self.model.signal_index(signal.into())?;
        if is_zero(d) {
            return self.eval(idx);
        }
        Ok(self.model.lookup_delayed(idx, d)?)
    }

    pub fn param(&self, p: ParamRef) -> ModelResult<f64> {
        self.model.param(p)
    }

    pub(crate) fn eval(&self, idx: usize) -> ModelResult<f64> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(ModelError::AlgebraicLoop {
                path: self.model.signal_path(idx).to_string(),
            });
        }
        self.depth.set(depth + 1);
        let out = self.model.eval_signal(idx, self);
        self.depth.set(depth);
        out
    }
}
