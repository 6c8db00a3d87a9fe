//! Signal store: commits, overrides and delayed lookups.
//!
//! Every node keeps one timestamp sequence and every signal one value
//! sequence. A commit walks a subtree in canonical order, pushing the node
//! timestamp first and then evaluating and pushing each signal, so after it
//! returns all histories under a node have the same length.

use std::collections::BTreeMap;
use std::ops::Index;

use crate::error::{LookupError, ModelError, ModelResult};
use crate::handle::{NodeRef, Signal};
use crate::model::Model;
use crate::scope::Scope;

/// Append a new sample or replace the latest one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitMode {
    Append,
    Override,
}

/// Index of the last timestamp not after `t`.
///
/// Scans backwards from the end while `timestamps[idx] > t && idx > 0`, so a
/// `t` before the first sample maps to 0. Returns 0 for an empty slice.
pub fn find_floor_index(t: f64, timestamps: &[f64]) -> usize {
    let mut idx = timestamps.len().saturating_sub(1);
    while idx > 0 && timestamps[idx] > t {
        idx -= 1;
    }
    idx
}

/// Recorded histories of one node, keyed by local signal name.
#[derive(Debug)]
pub struct Signals<'a> {
    time: &'a [f64],
    values: BTreeMap<&'a str, &'a [f64]>,
}

impl<'a> Signals<'a> {
    pub fn time(&self) -> &'a [f64] {
        self.time
    }

    /// History of `name`, or `None` when the node records no such signal.
    pub fn get(&self, name: &str) -> Option<&'a [f64]> {
        if name == crate::builder::TIME {
            return Some(self.time);
        }
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of recorded sequences, `time` included.
    pub fn len(&self) -> usize {
        self.values.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.values.keys().copied()
    }
}

/// Panics on an unknown name; use [`Signals::get`] when the name may be
/// absent.
impl Index<&str> for Signals<'_> {
    type Output = [f64];

    fn index(&self, name: &str) -> &[f64] {
        match self.get(name) {
            Some(h) => h,
            None => panic!("no signal named {name:?} on this node"),
        }
    }
}

impl Model {
    /// Append one sample at `t` for the whole tree.
    pub fn commit(&mut self, t: f64) -> ModelResult<()> {
        self.t = t;
        self.commit_node(self.root(), CommitMode::Append)
    }

    /// Replace the latest sample of the whole tree with values at `t`.
    pub fn commit_override(&mut self, t: f64) -> ModelResult<()> {
        self.t = t;
        self.commit_node(self.root(), CommitMode::Override)
    }

    /// Commit a subtree at the current time.
    ///
    /// On error the subtree's histories are restored to what they were.
    pub fn commit_node(&mut self, node: NodeRef, mode: CommitMode) -> ModelResult<()> {
        let n = self.node_index(node)?;
        let span = self.layout.nodes[n].clone();
        if mode == CommitMode::Override {
            let empty = self.layout.subtree(n).iter().enumerate().find_map(|(i, sub)| {
                self.nodes[n + i].times.is_empty().then(|| sub.path.clone())
            });
            if let Some(path) = empty {
                return Err(ModelError::NothingToOverride { path });
            }
        }

        let saved = Saved {
            times: span
                .subtree_nodes
                .clone()
                .map(|i| Tail::of(&self.nodes[i].times))
                .collect(),
            values: span
                .subtree_signals
                .clone()
                .map(|i| Tail::of(&self.signals[i].history))
                .collect(),
        };

        let result = self.commit_range(n, mode);
        if result.is_err() {
            for (i, tail) in span.subtree_nodes.clone().zip(&saved.times) {
                tail.restore(&mut self.nodes[i].times);
            }
            for (i, tail) in span.subtree_signals.clone().zip(&saved.values) {
                tail.restore(&mut self.signals[i].history);
            }
        }
        result
    }

    fn commit_range(&mut self, n: usize, mode: CommitMode) -> ModelResult<()> {
        let t = self.t;
        let nodes = self.layout.nodes[n].subtree_nodes.clone();
        for node in nodes {
            push_or_replace(&mut self.nodes[node].times, t, mode);
            let own = self.layout.nodes[node].signals.clone();
            for idx in own {
                let v = Scope::new(self).eval(idx)?;
                push_or_replace(&mut self.signals[idx].history, v, mode);
            }
        }
        Ok(())
    }

    /// Value of a signal `d` time units before the current time.
    ///
    /// `None` or a zero delay reads the live value without a lookup.
    pub fn delayed(&self, signal: impl Into<Signal>, d: Option<f64>) -> ModelResult<f64> {
        let scope = Scope::new(self);
        match d {
            None => scope.value(signal),
            Some(d) => scope.delayed(signal, d),
        }
    }

    pub(crate) fn lookup_delayed(&self, idx: usize, d: f64) -> Result<f64, LookupError> {
        let slot = &self.signals[idx];
        if d > 0.0 {
            return Err(LookupError::FutureDelay {
                path: slot.path.clone(),
                delay: d,
            });
        }
        let times = &self.nodes[slot.node].times;
        if times.is_empty() || slot.history.is_empty() {
            return Err(LookupError::EmptyHistory {
                path: slot.path.clone(),
            });
        }
        let target = (self.t + d).max(0.0);
        let i = find_floor_index(target, times);
        slot.history
            .get(i)
            .copied()
            .ok_or_else(|| LookupError::OutOfRange {
                path: slot.path.clone(),
                index: i,
                len: slot.history.len(),
            })
    }

    /// Recorded values of one signal.
    pub fn history(&self, signal: impl Into<Signal>) -> ModelResult<&[f64]> {
        let idx = self.signal_index(signal.into())?;
        Ok(&self.signals[idx].history)
    }

    /// Recorded timestamps of one node.
    pub fn times(&self, node: NodeRef) -> ModelResult<&[f64]> {
        Ok(&self.nodes[self.node_index(node)?].times)
    }

    /// Histories of the signals declared directly on `node`.
    pub fn signals(&self, node: NodeRef) -> ModelResult<Signals<'_>> {
        let n = self.node_index(node)?;
        let span = &self.layout.nodes[n];
        let prefix_len = if span.path.is_empty() {
            0
        } else {
            span.path.len() + 1
        };
        let values = span
            .signals
            .clone()
            .map(|i| {
                let slot = &self.signals[i];
                (&slot.path[prefix_len..], slot.history.as_slice())
            })
            .collect();
        Ok(Signals {
            time: &self.nodes[n].times,
            values,
        })
    }

    /// Number of committed samples under `node`.
    pub fn sample_count(&self, node: NodeRef) -> ModelResult<usize> {
        Ok(self.times(node)?.len())
    }
}

fn push_or_replace(seq: &mut Vec<f64>, v: f64, mode: CommitMode) {
    match mode {
        CommitMode::Append => seq.push(v),
        CommitMode::Override => {
            if let Some(last) = seq.last_mut() {
                *last = v;
            }
        }
    }
}

/// Length and last value of a sequence before a commit.
struct Tail {
    len: usize,
    last: Option<f64>,
}

impl Tail {
    fn of(seq: &[f64]) -> Self {
        Self {
            len: seq.len(),
            last: seq.last().copied(),
        }
    }

    fn restore(&self, seq: &mut Vec<f64>) {
        seq.truncate(self.len);
        if let (Some(last), Some(old)) = (seq.last_mut(), self.last) {
            *last = old;
        }
    }
}

struct Saved {
    times: Vec<Tail>,
    values: Vec<Tail>,
}
