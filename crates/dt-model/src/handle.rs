//! Typed handles for declared quantities.
//!
//! Handles are `Copy` and carry the process-unique key minted at
//! declaration, so a handle taken on a `ModelBuilder` keeps resolving after
//! the builder is attached to a parent and after `save()`.

use dt_core::Key;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateRef(pub(crate) Key);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputRef(pub(crate) Key);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarRef(pub(crate) Key);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamRef(pub(crate) Key);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef(pub(crate) Key);

impl StateRef {
    /// The recorded derivative signal (`der_<name>`) of this state.
    pub fn der(self) -> Signal {
        Signal::Derivative(self.0)
    }
}

/// Anything that is recorded on commit and can be read by a formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    State(Key),
    Derivative(Key),
    Input(Key),
    Var(Key),
}

impl From<StateRef> for Signal {
    fn from(s: StateRef) -> Self {
        Signal::State(s.0)
    }
}

impl From<InputRef> for Signal {
    fn from(i: InputRef) -> Self {
        Signal::Input(i.0)
    }
}

impl From<VarRef> for Signal {
    fn from(v: VarRef) -> Self {
        Signal::Var(v.0)
    }
}

/// A name resolved on one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    State(Key),
    Derivative(Key),
    Input(Key),
    Var(Key),
    Param(Key),
    Node(Key),
}

impl Entry {
    pub(crate) fn signal(self) -> Option<Signal> {
        match self {
            Entry::State(k) => Some(Signal::State(k)),
            Entry::Derivative(k) => Some(Signal::Derivative(k)),
            Entry::Input(k) => Some(Signal::Input(k)),
            Entry::Var(k) => Some(Signal::Var(k)),
            Entry::Param(_) | Entry::Node(_) => None,
        }
    }
}

/// Derivative signal name for a state.
pub(crate) fn der_name(state: &str) -> String {
    format!("der_{state}")
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
