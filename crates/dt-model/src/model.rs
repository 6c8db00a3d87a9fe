//! Frozen model: flattening, derivative evaluation and lookups.

use std::collections::HashMap;
use std::ops::Range;

use dt_core::Key;

use crate::error::{ModelError, ModelResult};
use crate::handle::{Entry, InputRef, NodeRef, ParamRef, Signal, StateRef, VarRef};
use crate::layout::Layout;
use crate::scope::{Formula, Scope};

pub(crate) struct StateSlot {
    pub path: String,
    pub initial: f64,
    pub der: Formula,
    pub value_signal: usize,
    pub der_signal: usize,
}

pub(crate) enum InputSource {
    Constant(f64),
    Formula(Formula),
    /// Reads another signal slot.
    Alias(usize),
}

pub(crate) enum Source {
    State(usize),
    Derivative(usize),
    Input { source: InputSource, wired: bool },
    Var(Formula),
}

pub(crate) struct SignalSlot {
    pub path: String,
    pub node: usize,
    pub source: Source,
    pub history: Vec<f64>,
}

pub(crate) struct ParamSlot {
    pub path: String,
    pub value: f64,
}

pub(crate) struct NodeSlot {
    pub times: Vec<f64>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Slot {
    State(usize),
    Input(usize),
    Var(usize),
    Param(usize),
    Node(usize),
}

/// A frozen model tree.
///
/// Structure is fixed; state values, parameter values, the current time and
/// the recorded histories are the only mutable parts.
pub struct Model {
    pub(crate) layout: Layout,
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) states: Vec<StateSlot>,
    pub(crate) values: Vec<f64>,
    pub(crate) signals: Vec<SignalSlot>,
    pub(crate) params: Vec<ParamSlot>,
    index: HashMap<Key, Slot>,
    paths: HashMap<String, Entry>,
    pub(crate) t: f64,
}

impl Model {
    pub(crate) fn from_parts(
        layout: Layout,
        nodes: Vec<NodeSlot>,
        states: Vec<StateSlot>,
        signals: Vec<SignalSlot>,
        params: Vec<ParamSlot>,
        index: HashMap<Key, Slot>,
        paths: HashMap<String, Entry>,
    ) -> Self {
        let values = states.iter().map(|s| s.initial).collect();
        Self {
            layout,
            nodes,
            states,
            values,
            signals,
            params,
            index,
            paths,
            t: 0.0,
        }
    }

    // ---- flattening ----

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Current state values in canonical order.
    pub fn flatten_state(&self) -> Vec<f64> {
        self.values.clone()
    }

    pub fn state_values(&self) -> &[f64] {
        &self.values
    }

    /// Overwrite every state value and the current time.
    pub fn scatter(&mut self, y: &[f64], t: f64) -> ModelResult<()> {
        if y.len() != self.values.len() {
            return Err(ModelError::LengthMismatch {
                what: "state vector",
                expected: self.values.len(),
                got: y.len(),
            });
        }
        self.values.copy_from_slice(y);
        self.t = t;
        Ok(())
    }

    /// Scatter `y` at `t`, then write every state derivative into `out`.
    pub fn derivatives(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> ModelResult<()> {
        self.scatter(y, t)?;
        self.eval_derivatives(out)
    }

    /// Derivatives at the current state and time.
    pub fn eval_derivatives(&self, out: &mut [f64]) -> ModelResult<()> {
        if out.len() != self.states.len() {
            return Err(ModelError::LengthMismatch {
                what: "derivative vector",
                expected: self.states.len(),
                got: out.len(),
            });
        }
        let scope = Scope::new(self);
        for (o, s) in out.iter_mut().zip(&self.states) {
            *o = scope.eval(s.der_signal)?;
        }
        Ok(())
    }

    /// Flat index of a state by dotted path.
    pub fn state_index(&self, path: &str) -> ModelResult<usize> {
        match self.paths.get(path) {
            Some(Entry::State(k)) => self.state_slot(StateRef(*k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a state"),
            }),
        }
    }

    /// Range of flat state indices owned by a subtree.
    pub fn state_range(&self, node: NodeRef) -> ModelResult<Range<usize>> {
        let n = self.node_index(node)?;
        Ok(self.layout.nodes[n].subtree_states.clone())
    }

    // ---- live values ----

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn set_time(&mut self, t: f64) {
        self.t = t;
    }

    /// Restore initial state values and clear every history.
    pub fn reset(&mut self) {
        for (v, s) in self.values.iter_mut().zip(&self.states) {
            *v = s.initial;
        }
        for sig in &mut self.signals {
            sig.history.clear();
        }
        for node in &mut self.nodes {
            node.times.clear();
        }
        self.t = 0.0;
    }

    /// Live value of a signal at the current time and state.
    pub fn value(&self, signal: impl Into<Signal>) -> ModelResult<f64> {
        Scope::new(self).value(signal)
    }

    pub fn state(&self, s: StateRef) -> ModelResult<f64> {
        Ok(self.values[self.state_slot(s)?])
    }

    /// Set one state value directly.
    pub fn assign(&mut self, s: StateRef, value: f64) -> ModelResult<()> {
        let slot = self.state_slot(s)?;
        self.values[slot] = value;
        Ok(())
    }

    pub fn param(&self, p: ParamRef) -> ModelResult<f64> {
        Ok(self.params[self.param_slot(p)?].value)
    }

    pub fn set_param(&mut self, p: ParamRef, value: f64) -> ModelResult<()> {
        let slot = self.param_slot(p)?;
        self.params[slot].value = value;
        Ok(())
    }

    /// Live values of every signal, in commit order (see `signal_names`).
    pub fn current_signals(&self) -> ModelResult<Vec<f64>> {
        let scope = Scope::new(self);
        (0..self.signals.len()).map(|i| scope.eval(i)).collect()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Dotted paths of every recorded signal in commit order; node
    /// timestamps are not included.
    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.path.as_str()).collect()
    }

    /// Dotted paths of every state in canonical (flat vector) order.
    pub fn state_names(&self) -> Vec<&str> {
        self.states.iter().map(|s| s.path.as_str()).collect()
    }

    // ---- frozen structure ----
    //
    // `rebind` and `redefine` are the rejection surface for structural edits
    // on a frozen model: the builder-only methods `connect`, `bind` and `var`
    // have no `Model` counterpart, so these two exist to report `Frozen` (and
    // `UnknownSignal` for a foreign handle) instead.

    /// Always fails: wiring is fixed once frozen.
    ///
    /// # Errors
    /// `UnknownSignal` when `input` is not part of this model, `Frozen`
    /// otherwise.
    pub fn rebind<F>(&mut self, input: InputRef, _f: F) -> ModelResult<()>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        let path = self.path_of(input)?;
        tracing::warn!(input = path, "rebind on frozen model");
        Err(ModelError::Frozen {
            what: "inputs cannot be rewired after save()",
        })
    }

    /// Always fails: var formulas are fixed once frozen.
    ///
    /// # Errors
    /// `UnknownSignal` when `var` is not part of this model, `Frozen`
    /// otherwise.
    pub fn redefine<F>(&mut self, var: VarRef, _f: F) -> ModelResult<()>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        let path = self.path_of(var)?;
        tracing::warn!(var = path, "redefine on frozen model");
        Err(ModelError::Frozen {
            what: "vars cannot be redefined after save()",
        })
    }

    /// True when `input` was wired and what it reads does not live inside
    /// `node`'s subtree (a bound formula counts as outside).
    pub fn is_wired_outside(&self, input: InputRef, node: NodeRef) -> ModelResult<bool> {
        let idx = self.signal_index(input.into())?;
        let n = self.node_index(node)?;
        let span = &self.layout.nodes[n].subtree_signals;
        match &self.signals[idx].source {
            Source::Input { wired: false, .. } => Ok(false),
            Source::Input {
                source: InputSource::Alias(target),
                ..
            } => Ok(!span.contains(target)),
            Source::Input { .. } => Ok(true),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{} is not an input", self.signals[idx].path),
            }),
        }
    }

    /// Inputs declared in `node`'s subtree with their paths relative to it.
    pub fn subtree_inputs(&self, node: NodeRef) -> ModelResult<Vec<(String, InputRef)>> {
        let n = self.node_index(node)?;
        let prefix = &self.layout.nodes[n].path;
        let mut out = Vec::new();
        for (key, slot) in &self.index {
            if let Slot::Input(idx) = slot {
                if self.layout.nodes[n].subtree_signals.contains(idx) {
                    let path = &self.signals[*idx].path;
                    out.push((*idx, relative(prefix, path).to_string(), InputRef(*key)));
                }
            }
        }
        out.sort_by_key(|(idx, _, _)| *idx);
        Ok(out.into_iter().map(|(_, path, r)| (path, r)).collect())
    }

    // ---- path lookups ----

    fn entry(&self, path: &str) -> ModelResult<Entry> {
        self.paths
            .get(path)
            .copied()
            .ok_or_else(|| ModelError::UnknownSignal {
                what: path.to_string(),
            })
    }

    pub fn find_signal(&self, path: &str) -> ModelResult<Signal> {
        self.entry(path)?
            .signal()
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("{path} is not a signal"),
            })
    }

    pub fn find_state(&self, path: &str) -> ModelResult<StateRef> {
        match self.entry(path)? {
            Entry::State(k) => Ok(StateRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a state"),
            }),
        }
    }

    pub fn find_input(&self, path: &str) -> ModelResult<InputRef> {
        match self.entry(path)? {
            Entry::Input(k) => Ok(InputRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not an input"),
            }),
        }
    }

    pub fn find_var(&self, path: &str) -> ModelResult<VarRef> {
        match self.entry(path)? {
            Entry::Var(k) => Ok(VarRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a var"),
            }),
        }
    }

    pub fn find_param(&self, path: &str) -> ModelResult<ParamRef> {
        match self.entry(path)? {
            Entry::Param(k) => Ok(ParamRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a parameter"),
            }),
        }
    }

    pub fn find_node(&self, path: &str) -> ModelResult<NodeRef> {
        if path.is_empty() {
            return Ok(self.root());
        }
        match self.entry(path)? {
            Entry::Node(k) => Ok(NodeRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a node"),
            }),
        }
    }

    pub fn root(&self) -> NodeRef {
        NodeRef(self.layout.nodes[0].key)
    }

    /// Dotted path of a node (empty for the root).
    pub fn node_path(&self, node: NodeRef) -> ModelResult<&str> {
        Ok(&self.layout.nodes[self.node_index(node)?].path)
    }

    /// Dotted path of a signal.
    pub fn path_of(&self, signal: impl Into<Signal>) -> ModelResult<&str> {
        Ok(self.signal_path(self.signal_index(signal.into())?))
    }

    /// Dotted path of a parameter.
    pub fn param_path(&self, p: ParamRef) -> ModelResult<&str> {
        Ok(&self.params[self.param_slot(p)?].path)
    }

    // ---- internals ----

    pub(crate) fn node_index(&self, node: NodeRef) -> ModelResult<usize> {
        match self.index.get(&node.0) {
            Some(Slot::Node(n)) => Ok(*n),
            _ => Err(ModelError::UnknownSignal {
                what: format!("node {node:?} is not in this model"),
            }),
        }
    }

    fn state_slot(&self, s: StateRef) -> ModelResult<usize> {
        match self.index.get(&s.0) {
            Some(Slot::State(i)) => Ok(*i),
            _ => Err(ModelError::UnknownSignal {
                what: format!("state {s:?} is not in this model"),
            }),
        }
    }

    fn param_slot(&self, p: ParamRef) -> ModelResult<usize> {
        match self.index.get(&p.0) {
            Some(Slot::Param(i)) => Ok(*i),
            _ => Err(ModelError::UnknownSignal {
                what: format!("parameter {p:?} is not in this model"),
            }),
        }
    }

    pub(crate) fn signal_index(&self, signal: Signal) -> ModelResult<usize> {
        let key = match signal {
            Signal::State(k) | Signal::Derivative(k) | Signal::Input(k) | Signal::Var(k) => k,
        };
        match (signal, self.index.get(&key)) {
            (Signal::State(_), Some(Slot::State(s))) => Ok(self.states[*s].value_signal),
            (Signal::Derivative(_), Some(Slot::State(s))) => Ok(self.states[*s].der_signal),
            (Signal::Input(_), Some(Slot::Input(i))) | (Signal::Var(_), Some(Slot::Var(i))) => {
                Ok(*i)
            }
            _ => Err(ModelError::UnknownSignal {
                what: format!("{signal:?} is not in this model"),
            }),
        }
    }

    pub(crate) fn signal_path(&self, idx: usize) -> &str {
        &self.signals[idx].path
    }

    pub(crate) fn eval_signal(&self, idx: usize, scope: &Scope<'_>) -> ModelResult<f64> {
        match &self.signals[idx].source {
            Source::State(s) => Ok(self.values[*s]),
            Source::Derivative(s) => (self.states[*s].der)(scope),
            Source::Input { source, .. } => match source {
                InputSource::Constant(c) => Ok(*c),
                InputSource::Formula(f) => f(scope),
                InputSource::Alias(target) => scope.eval(*target),
            },
            Source::Var(f) => f(scope),
        }
    }
}

fn relative<'p>(prefix: &str, path: &'p str) -> &'p str {
    if prefix.is_empty() {
        return path;
    }
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(path)
}
