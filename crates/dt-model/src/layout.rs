//! Canonical ordering of a frozen tree.
//!
//! One depth-first walk at `save()` assigns every node, state slot and
//! signal slot its position. Per node the order is: states (value then
//! derivative signal), inputs, vars, then children in declaration order.
//! Because the walk is preorder, every subtree owns contiguous ranges of
//! nodes, state slots and signal slots; flatten, scatter, derivative
//! evaluation and commit all iterate those ranges.

use std::collections::HashMap;
use std::ops::Range;

use dt_core::Key;

use crate::builder::{Binding, ModelBuilder};
use crate::error::{ModelError, ModelResult};
use crate::handle::{Entry, Signal, der_name, join_path};
use crate::model::{
    InputSource, Model, NodeSlot, ParamSlot, SignalSlot, Slot, Source, StateSlot,
};

#[derive(Debug, Clone)]
pub(crate) struct NodeSpan {
    pub key: Key,
    pub path: String,
    pub parent: Option<usize>,
    /// Own states only.
    pub states: Range<usize>,
    /// Own signals only.
    pub signals: Range<usize>,
    pub subtree_nodes: Range<usize>,
    pub subtree_states: Range<usize>,
    pub subtree_signals: Range<usize>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Layout {
    pub nodes: Vec<NodeSpan>,
}

impl Layout {
    pub fn subtree(&self, node: usize) -> &[NodeSpan] {
        &self.nodes[self.nodes[node].subtree_nodes.clone()]
    }
}

#[derive(Default)]
struct Walk {
    layout: Layout,
    states: Vec<StateSlot>,
    signals: Vec<SignalSlot>,
    params: Vec<ParamSlot>,
    index: HashMap<Key, Slot>,
    paths: HashMap<String, Entry>,
    pending: Vec<(usize, Binding)>,
}

impl Walk {
    fn visit(&mut self, b: ModelBuilder, path: String, parent: Option<usize>) -> ModelResult<()> {
        let node = self.layout.nodes.len();
        let state_start = self.states.len();
        let signal_start = self.signals.len();
        self.layout.nodes.push(NodeSpan {
            key: b.key,
            path: path.clone(),
            parent,
            states: state_start..state_start,
            signals: signal_start..signal_start,
            subtree_nodes: node..node,
            subtree_states: state_start..state_start,
            subtree_signals: signal_start..signal_start,
        });
        self.index.insert(b.key, Slot::Node(node));
        if !path.is_empty() {
            self.paths.insert(path.clone(), Entry::Node(b.key));
        }

        for s in b.states {
            let state_path = join_path(&path, &s.name);
            let der_path = join_path(&path, &der_name(&s.name));
            let slot = self.states.len();
            let value_signal = self.signals.len();
            self.signals.push(SignalSlot {
                path: state_path.clone(),
                node,
                source: Source::State(slot),
                history: Vec::new(),
            });
            self.signals.push(SignalSlot {
                path: der_path.clone(),
                node,
                source: Source::Derivative(slot),
                history: Vec::new(),
            });
            let der = s.der.ok_or_else(|| ModelError::MissingDerivative {
                path: state_path.clone(),
            })?;
            self.states.push(StateSlot {
                path: state_path.clone(),
                initial: s.initial,
                der,
                value_signal,
                der_signal: value_signal + 1,
            });
            self.index.insert(s.key, Slot::State(slot));
            self.paths.insert(state_path, Entry::State(s.key));
            self.paths.insert(der_path, Entry::Derivative(s.key));
        }

        for i in b.inputs {
            let input_path = join_path(&path, &i.name);
            let idx = self.signals.len();
            self.signals.push(SignalSlot {
                path: input_path.clone(),
                node,
                source: Source::Input {
                    source: InputSource::Constant(0.0),
                    wired: i.wired,
                },
                history: Vec::new(),
            });
            self.pending.push((idx, i.binding));
            self.index.insert(i.key, Slot::Input(idx));
            self.paths.insert(input_path, Entry::Input(i.key));
        }

        for v in b.vars {
            let var_path = join_path(&path, &v.name);
            let idx = self.signals.len();
            self.signals.push(SignalSlot {
                path: var_path.clone(),
                node,
                source: Source::Var(v.formula),
                history: Vec::new(),
            });
            self.index.insert(v.key, Slot::Var(idx));
            self.paths.insert(var_path, Entry::Var(v.key));
        }

        for p in b.params {
            let param_path = join_path(&path, &p.name);
            let idx = self.params.len();
            self.params.push(ParamSlot {
                path: param_path.clone(),
                value: p.value,
            });
            self.index.insert(p.key, Slot::Param(idx));
            self.paths.insert(param_path, Entry::Param(p.key));
        }

        let own_states = state_start..self.states.len();
        let own_signals = signal_start..self.signals.len();
        for child in b.children {
            let child_path = join_path(&path, &child.name);
            self.visit(child.builder, child_path, Some(node))?;
        }

        let subtree_end = self.layout.nodes.len();
        let span = &mut self.layout.nodes[node];
        span.states = own_states;
        span.signals = own_signals;
        span.subtree_nodes = node..subtree_end;
        span.subtree_states = state_start..self.states.len();
        span.subtree_signals = signal_start..self.signals.len();
        Ok(())
    }

    fn signal_index(&self, signal: Signal) -> ModelResult<usize> {
        let unknown = || ModelError::UnknownSignal {
            what: format!("{signal:?}"),
        };
        let slot = match signal {
            Signal::State(k) | Signal::Derivative(k) | Signal::Input(k) | Signal::Var(k) => {
                self.index.get(&k).ok_or_else(unknown)?
            }
        };
        match (signal, slot) {
            (Signal::State(_), Slot::State(s)) => Ok(self.states[*s].value_signal),
            (Signal::Derivative(_), Slot::State(s)) => Ok(self.states[*s].der_signal),
            (Signal::Input(_), Slot::Input(i)) | (Signal::Var(_), Slot::Var(i)) => Ok(*i),
            _ => Err(unknown()),
        }
    }
}

/// Walk the builder tree once and produce the frozen arena.
pub(crate) fn freeze(root: ModelBuilder) -> ModelResult<Model> {
    let mut walk = Walk::default();
    walk.visit(root, String::new(), None)?;

    let pending = std::mem::take(&mut walk.pending);
    for (idx, binding) in pending {
        let resolved = match binding {
            Binding::Constant(c) => InputSource::Constant(c),
            Binding::Formula(f) => InputSource::Formula(f),
            Binding::Signal(s) => InputSource::Alias(walk.signal_index(s)?),
        };
        if let Source::Input { source, .. } = &mut walk.signals[idx].source {
            *source = resolved;
        }
    }

    let nodes = walk
        .layout
        .nodes
        .iter()
        .map(|_| NodeSlot { times: Vec::new() })
        .collect();

    tracing::debug!(
        nodes = walk.layout.nodes.len(),
        states = walk.states.len(),
        signals = walk.signals.len(),
        "model frozen"
    );

    Ok(Model::from_parts(
        walk.layout,
        nodes,
        walk.states,
        walk.signals,
        walk.params,
        walk.index,
        walk.paths,
    ))
}
