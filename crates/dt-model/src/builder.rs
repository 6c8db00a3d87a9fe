//! Declarative model construction.
//!
//! A `ModelBuilder` collects states, inputs, vars, parameters and child
//! builders, then `save()` validates the tree and freezes it into a `Model`.
//! Nothing structural can change after that.

use std::collections::HashSet;

use dt_core::Key;

use crate::error::{ModelError, ModelResult};
use crate::handle::{Entry, InputRef, NodeRef, ParamRef, Signal, StateRef, VarRef, der_name};
use crate::layout;
use crate::model::Model;
use crate::scope::{Formula, Scope, formula};

/// Signal name every node records its timestamps under.
pub const TIME: &str = "time";

/// What an input reads.
#[derive(Clone)]
pub(crate) enum Binding {
    Constant(f64),
    Formula(Formula),
    Signal(Signal),
}

pub(crate) struct StateDecl {
    pub key: Key,
    pub name: String,
    pub initial: f64,
    pub der: Option<Formula>,
}

pub(crate) struct InputDecl {
    pub key: Key,
    pub name: String,
    pub binding: Binding,
    pub wired: bool,
}

pub(crate) struct VarDecl {
    pub key: Key,
    pub name: String,
    pub formula: Formula,
}

pub(crate) struct ParamDecl {
    pub key: Key,
    pub name: String,
    pub value: f64,
}

pub(crate) struct ChildDecl {
    pub name: String,
    pub builder: ModelBuilder,
}

/// A model node under construction.
pub struct ModelBuilder {
    pub(crate) key: Key,
    names: HashSet<String>,
    pub(crate) states: Vec<StateDecl>,
    pub(crate) inputs: Vec<InputDecl>,
    pub(crate) vars: Vec<VarDecl>,
    pub(crate) params: Vec<ParamDecl>,
    pub(crate) children: Vec<ChildDecl>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ModelBuilder {
    pub fn new() -> Self {
        let mut names = HashSet::new();
        names.insert(TIME.to_string());
        Self {
            key: Key::fresh(),
            names,
            states: Vec::new(),
            inputs: Vec::new(),
            vars: Vec::new(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Handle of this node, valid on the frozen model as well.
    pub fn node(&self) -> NodeRef {
        NodeRef(self.key)
    }

    fn check_name(&self, name: &str) -> ModelResult<()> {
        if !is_identifier(name) {
            return Err(ModelError::InvalidName {
                name: name.to_string(),
            });
        }
        if self.names.contains(name) {
            return Err(ModelError::Duplicate {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn reserve(&mut self, name: &str) -> ModelResult<()> {
        self.check_name(name)?;
        self.names.insert(name.to_string());
        Ok(())
    }

    /// Declare a state with its initial value. Also reserves `der_<name>`.
    pub fn state(&mut self, name: &str, initial: f64) -> ModelResult<StateRef> {
        let der = der_name(name);
        self.check_name(name)?;
        self.check_name(&der)?;
        self.names.insert(name.to_string());
        self.names.insert(der);
        let key = Key::fresh();
        self.states.push(StateDecl {
            key,
            name: name.to_string(),
            initial,
            der: None,
        });
        Ok(StateRef(key))
    }

    /// Declare an input defaulting to a constant.
    pub fn input(&mut self, name: &str, default: f64) -> ModelResult<InputRef> {
        self.push_input(name, Binding::Constant(default))
    }

    /// Declare an input defaulting to a formula.
    pub fn input_with<F>(&mut self, name: &str, default: F) -> ModelResult<InputRef>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        self.push_input(name, Binding::Formula(formula(default)))
    }

    fn push_input(&mut self, name: &str, binding: Binding) -> ModelResult<InputRef> {
        self.reserve(name)?;
        let key = Key::fresh();
        self.inputs.push(InputDecl {
            key,
            name: name.to_string(),
            binding,
            wired: false,
        });
        Ok(InputRef(key))
    }

    pub fn var<F>(&mut self, name: &str, f: F) -> ModelResult<VarRef>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        self.reserve(name)?;
        let key = Key::fresh();
        self.vars.push(VarDecl {
            key,
            name: name.to_string(),
            formula: formula(f),
        });
        Ok(VarRef(key))
    }

    pub fn parameter(&mut self, name: &str, value: f64) -> ModelResult<ParamRef> {
        self.reserve(name)?;
        let key = Key::fresh();
        self.params.push(ParamDecl {
            key,
            name: name.to_string(),
            value,
        });
        Ok(ParamRef(key))
    }

    /// Define the derivative of a state declared on this node.
    pub fn der<F>(&mut self, state: StateRef, f: F) -> ModelResult<()>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        let decl = self
            .states
            .iter_mut()
            .find(|s| s.key == state.0)
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("state {state:?} is not declared on this node"),
            })?;
        if decl.der.is_some() {
            return Err(ModelError::DerivativeExists {
                path: decl.name.clone(),
            });
        }
        decl.der = Some(formula(f));
        Ok(())
    }

    /// Attach a child node.
    pub fn model(&mut self, name: &str, child: ModelBuilder) -> ModelResult<NodeRef> {
        self.reserve(name)?;
        let node = child.node();
        self.children.push(ChildDecl {
            name: name.to_string(),
            builder: child,
        });
        Ok(node)
    }

    /// Wire `input` to whatever `target` resolves to right now.
    ///
    /// An input target is copied by binding, so wiring that target later
    /// leaves this input untouched. Both handles must live in this subtree.
    pub fn connect(&mut self, input: InputRef, target: impl Into<Signal>) -> ModelResult<()> {
        let target = target.into();
        let snapshot = self.snapshot(target)?;
        self.wire(input, snapshot)
    }

    /// Wire `input` to an arbitrary formula. Same once-only rule as `connect`.
    pub fn bind<F>(&mut self, input: InputRef, f: F) -> ModelResult<()>
    where
        F: Fn(&Scope<'_>) -> ModelResult<f64> + 'static,
    {
        self.wire(input, Binding::Formula(formula(f)))
    }

    fn wire(&mut self, input: InputRef, binding: Binding) -> ModelResult<()> {
        let decl = self
            .input_mut(input.0)
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("input {input:?} is not in this subtree"),
            })?;
        if decl.wired {
            return Err(ModelError::AlreadyWired {
                path: decl.name.clone(),
            });
        }
        decl.binding = binding;
        decl.wired = true;
        Ok(())
    }

    fn snapshot(&self, target: Signal) -> ModelResult<Binding> {
        if let Signal::Input(key) = target {
            if let Some(decl) = self.input_decl(key) {
                return Ok(decl.binding.clone());
            }
        } else if self.contains_signal(target) {
            return Ok(Binding::Signal(target));
        }
        Err(ModelError::UnknownSignal {
            what: format!("connection target {target:?} is not in this subtree"),
        })
    }

    fn input_decl(&self, key: Key) -> Option<&InputDecl> {
        self.inputs.iter().find(|i| i.key == key).or_else(|| {
            self.children
                .iter()
                .find_map(|c| c.builder.input_decl(key))
        })
    }

    fn input_mut(&mut self, key: Key) -> Option<&mut InputDecl> {
        if let Some(pos) = self.inputs.iter().position(|i| i.key == key) {
            return self.inputs.get_mut(pos);
        }
        self.children
            .iter_mut()
            .find_map(|c| c.builder.input_mut(key))
    }

    fn contains_signal(&self, signal: Signal) -> bool {
        let own = match signal {
            Signal::State(k) | Signal::Derivative(k) => self.states.iter().any(|s| s.key == k),
            Signal::Input(k) => self.inputs.iter().any(|i| i.key == k),
            Signal::Var(k) => self.vars.iter().any(|v| v.key == k),
        };
        own || self
            .children
            .iter()
            .any(|c| c.builder.contains_signal(signal))
    }

    /// True once `input` has been connected or bound.
    pub fn is_wired(&self, input: InputRef) -> ModelResult<bool> {
        self.input_decl(input.0)
            .map(|decl| decl.wired)
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("input {input:?} is not in this subtree"),
            })
    }

    /// Change a parameter's value before freezing.
    pub fn set_param(&mut self, p: ParamRef, value: f64) -> ModelResult<()> {
        let decl = self
            .param_mut(p.0)
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("parameter {p:?} is not in this subtree"),
            })?;
        decl.value = value;
        Ok(())
    }

    fn param_mut(&mut self, key: Key) -> Option<&mut ParamDecl> {
        if let Some(pos) = self.params.iter().position(|p| p.key == key) {
            return self.params.get_mut(pos);
        }
        self.children
            .iter_mut()
            .find_map(|c| c.builder.param_mut(key))
    }

    fn local(&self, name: &str) -> Option<Entry> {
        if let Some(s) = self.states.iter().find(|s| s.name == name) {
            return Some(Entry::State(s.key));
        }
        if let Some(s) = self.states.iter().find(|s| der_name(&s.name) == name) {
            return Some(Entry::Derivative(s.key));
        }
        if let Some(i) = self.inputs.iter().find(|i| i.name == name) {
            return Some(Entry::Input(i.key));
        }
        if let Some(v) = self.vars.iter().find(|v| v.name == name) {
            return Some(Entry::Var(v.key));
        }
        if let Some(p) = self.params.iter().find(|p| p.name == name) {
            return Some(Entry::Param(p.key));
        }
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| Entry::Node(c.builder.key))
    }

    fn resolve(&self, path: &str) -> ModelResult<Entry> {
        let unknown = || ModelError::UnknownSignal {
            what: path.to_string(),
        };
        let mut node = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return node.local(segment).ok_or_else(unknown);
            }
            node = node
                .children
                .iter()
                .find(|c| c.name == segment)
                .map(|c| &c.builder)
                .ok_or_else(unknown)?;
        }
        Err(unknown())
    }

    /// Resolve a dotted path (`"md.x"`, `"s.der_v"`) to a signal handle.
    pub fn find_signal(&self, path: &str) -> ModelResult<Signal> {
        self.resolve(path)?
            .signal()
            .ok_or_else(|| ModelError::UnknownSignal {
                what: format!("{path} is not a signal"),
            })
    }

    pub fn find_state(&self, path: &str) -> ModelResult<StateRef> {
        match self.resolve(path)? {
            Entry::State(k) => Ok(StateRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a state"),
            }),
        }
    }

    pub fn find_input(&self, path: &str) -> ModelResult<InputRef> {
        match self.resolve(path)? {
            Entry::Input(k) => Ok(InputRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not an input"),
            }),
        }
    }

    pub fn find_var(&self, path: &str) -> ModelResult<VarRef> {
        match self.resolve(path)? {
            Entry::Var(k) => Ok(VarRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a var"),
            }),
        }
    }

    pub fn find_param(&self, path: &str) -> ModelResult<ParamRef> {
        match self.resolve(path)? {
            Entry::Param(k) => Ok(ParamRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a parameter"),
            }),
        }
    }

    pub fn find_node(&self, path: &str) -> ModelResult<NodeRef> {
        match self.resolve(path)? {
            Entry::Node(k) => Ok(NodeRef(k)),
            _ => Err(ModelError::UnknownSignal {
                what: format!("{path} is not a node"),
            }),
        }
    }

    /// Validate and freeze the whole tree.
    pub fn save(self) -> ModelResult<Model> {
        layout::freeze(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_and_invalid_names_rejected() {
        let mut b = ModelBuilder::new();
        b.state("x", 0.0).unwrap();
        assert!(matches!(
            b.var("x", |_| Ok(0.0)),
            Err(ModelError::Duplicate { .. })
        ));
        // der_x is reserved by the state
        assert!(matches!(
            b.input("der_x", 0.0),
            Err(ModelError::Duplicate { .. })
        ));
        assert!(matches!(
            b.parameter("time", 1.0),
            Err(ModelError::Duplicate { .. })
        ));
        assert!(matches!(
            b.parameter("1k", 1.0),
            Err(ModelError::InvalidName { .. })
        ));
        assert!(matches!(
            b.parameter("a.b", 1.0),
            Err(ModelError::InvalidName { .. })
        ));
    }

    #[test]
    fn der_rules() {
        let mut b = ModelBuilder::new();
        let x = b.state("x", 0.0).unwrap();
        b.der(x, |_| Ok(1.0)).unwrap();
        assert!(matches!(
            b.der(x, |_| Ok(2.0)),
            Err(ModelError::DerivativeExists { .. })
        ));

        let mut other = ModelBuilder::new();
        assert!(matches!(
            other.der(x, |_| Ok(0.0)),
            Err(ModelError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn missing_derivative_reported_with_path() {
        let mut child = ModelBuilder::new();
        child.state("v", 1.0).unwrap();
        let mut root = ModelBuilder::new();
        root.model("md", child).unwrap();
        match root.save() {
            Err(ModelError::MissingDerivative { path }) => assert_eq!(path, "md.v"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected MissingDerivative"),
        }
    }

    #[test]
    fn inputs_wire_once() {
        let mut b = ModelBuilder::new();
        let u = b.input("u", 0.0).unwrap();
        let v = b.var("v", |_| Ok(3.0)).unwrap();
        assert!(!b.is_wired(u).unwrap());
        b.connect(u, v).unwrap();
        assert!(b.is_wired(u).unwrap());
        assert!(matches!(
            b.connect(u, v),
            Err(ModelError::AlreadyWired { .. })
        ));
        assert!(matches!(
            b.bind(u, |_| Ok(1.0)),
            Err(ModelError::AlreadyWired { .. })
        ));
    }

    #[test]
    fn connect_outside_subtree_rejected() {
        let mut a = ModelBuilder::new();
        let u = a.input("u", 0.0).unwrap();
        let mut b = ModelBuilder::new();
        let v = b.var("v", |_| Ok(1.0)).unwrap();
        assert!(matches!(
            a.connect(u, v),
            Err(ModelError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn paths_resolve_through_children() {
        let mut child = ModelBuilder::new();
        let x = child.state("x", 0.0).unwrap();
        let f = child.input("F", 0.0).unwrap();
        let k = child.parameter("k", 2.0).unwrap();
        let mut root = ModelBuilder::new();
        let md = root.model("md", child).unwrap();

        assert_eq!(root.find_state("md.x").unwrap(), x);
        assert_eq!(root.find_signal("md.der_x").unwrap(), x.der());
        assert_eq!(root.find_input("md.F").unwrap(), f);
        assert_eq!(root.find_param("md.k").unwrap(), k);
        assert_eq!(root.find_node("md").unwrap(), md);
        assert!(root.find_signal("md.k").is_err());
        assert!(root.find_signal("nope.x").is_err());
        assert!(root.find_input("md.x").is_err());
    }
}
