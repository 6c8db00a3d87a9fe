//! Calibration window and candidate replay.
//!
//! A candidate is a fresh surrogate from the factory, frozen on its own:
//! - inputs the live tree wired from outside the surrogate are bound to
//!   replay the live input's recorded history (floor lookup)
//! - its initial state is the live surrogate's recorded state at the window
//!   start, overridden per state from reference signals where requested
//! - every objective evaluation resets it and runs it over the window

use dt_core::linspace;
use dt_model::{LookupError, Model, ModelResult, ParamRef, Signal, find_floor_index};
use dt_sim::{SimOptions, SimRecord, simulate};

use crate::error::{TrackError, TrackResult};
use crate::simulator::TrackingSimulator;

/// Error sample times snapped to recorded timestamps.
#[derive(Clone, Debug)]
pub(crate) struct Window {
    pub t0: f64,
    pub t1: f64,
    /// History index of each sample.
    pub indices: Vec<usize>,
    /// Recorded timestamp of each sample.
    pub times: Vec<f64>,
}

impl Window {
    /// Samples `[max(0, t - horizon), t]` of the live model at `t`.
    pub fn capture(model: &Model, horizon: f64, nsamples: usize) -> TrackResult<Self> {
        let t = model.time();
        let recorded = model.times(model.root())?;
        if recorded.is_empty() {
            return Err(TrackError::Model(
                LookupError::EmptyHistory {
                    path: "time".to_string(),
                }
                .into(),
            ));
        }
        let taus = linspace((t - horizon).max(0.0), t, nsamples)?;
        let indices: Vec<usize> = taus
            .iter()
            .map(|&tau| find_floor_index(tau, recorded))
            .collect();
        let times: Vec<f64> = indices.iter().map(|&i| recorded[i]).collect();
        Ok(Self {
            t0: times[0],
            t1: t,
            indices,
            times,
        })
    }

    pub fn start(&self) -> usize {
        self.indices[0]
    }

    /// Recorded values of `signal` at the window samples.
    pub fn sample(&self, model: &Model, signal: Signal) -> TrackResult<Vec<f64>> {
        let history = model.history(signal)?;
        self.indices
            .iter()
            .map(|&i| value_at(model, signal, history, i))
            .collect()
    }
}

fn value_at(model: &Model, signal: Signal, history: &[f64], index: usize) -> TrackResult<f64> {
    match history.get(index) {
        Some(v) => Ok(*v),
        None => Err(TrackError::Model(
            LookupError::OutOfRange {
                path: model.path_of(signal)?.to_string(),
                index,
                len: history.len(),
            }
            .into(),
        )),
    }
}

/// How a matched surrogate signal is read back from a candidate run.
enum Probe {
    /// Flat state index; read from the interpolated run record.
    State(usize),
    /// Var or input; evaluated on each interpolated row.
    Signal(Signal),
}

pub(crate) struct Candidate {
    model: Model,
    initial: Vec<f64>,
    params: Vec<ParamRef>,
    probes: Vec<Probe>,
    replayed: usize,
}

/// One candidate run over the window.
pub(crate) struct Trajectory {
    pub record: SimRecord,
    /// Surrogate values per matched pair at the window samples.
    pub fitted: Vec<Vec<f64>>,
}

impl Candidate {
    pub fn build(sim: &TrackingSimulator, window: &Window) -> TrackResult<Self> {
        let live = &sim.model;
        let mut builder = (sim.factory)()?;

        let mut replayed = 0;
        let times = live.times(sim.surrogate)?;
        let start = window.start().min(times.len());
        for (path, input) in live.subtree_inputs(sim.surrogate)? {
            if !live.is_wired_outside(input, sim.surrogate)? {
                continue;
            }
            let local = builder.find_input(&path)?;
            if builder.is_wired(local)? {
                continue;
            }
            let values = live.history(input)?[start..].to_vec();
            let stamps = times[start..].to_vec();
            builder.bind(local, move |s| replay(&stamps, &values, s.time(), &path))?;
            replayed += 1;
        }
        let model = builder.save()?;

        let range = live.state_range(sim.surrogate)?;
        if range.len() != model.state_count() {
            return Err(TrackError::Config {
                what: "surrogate factory built a different state layout",
            });
        }
        let surrogate_path = live.node_path(sim.surrogate)?;
        let mut initial = Vec::with_capacity(range.len());
        for name in model.state_names() {
            let signal = live.find_signal(&format!("{surrogate_path}.{name}"))?;
            let history = live.history(signal)?;
            initial.push(value_at(live, signal, history, window.start())?);
        }
        for (state, signal) in &sim.restore {
            let history = live.history(*signal)?;
            initial[model.state_index(state)?] = value_at(live, *signal, history, window.start())?;
        }

        let params = sim
            .free
            .iter()
            .map(|(name, _)| model.find_param(name))
            .collect::<ModelResult<Vec<_>>>()?;
        let probes = sim
            .pairs
            .iter()
            .map(|pair| match model.state_index(&pair.local) {
                Ok(i) => Ok(Probe::State(i)),
                Err(_) => model.find_signal(&pair.local).map(Probe::Signal),
            })
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(Self {
            model,
            initial,
            params,
            probes,
            replayed,
        })
    }

    pub fn replayed_inputs(&self) -> usize {
        self.replayed
    }

    /// Reset, apply `values` to the free parameters and run over the window.
    pub fn run(
        &mut self,
        values: &[f64],
        window: &Window,
        opts: &SimOptions,
    ) -> TrackResult<Trajectory> {
        self.model.reset();
        for (p, v) in self.params.iter().zip(values) {
            self.model.set_param(*p, *v)?;
        }
        self.model.scatter(&self.initial, window.t0)?;
        let record = simulate(&mut self.model, window.t0, window.t1, opts)?;
        if record.len() != window.times.len() {
            return Err(TrackError::Config {
                what: "candidate run did not report every window sample",
            });
        }

        let mut fitted = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let values = match probe {
                Probe::State(i) => record.x.iter().map(|row| row[*i]).collect(),
                Probe::Signal(signal) => evaluate_along(&mut self.model, *signal, &record)?,
            };
            fitted.push(values);
        }
        Ok(Trajectory { record, fitted })
    }
}

/// Value of `signal` at every record row, evaluated on the row's state.
fn evaluate_along(model: &mut Model, signal: Signal, record: &SimRecord) -> TrackResult<Vec<f64>> {
    let mut out = Vec::with_capacity(record.len());
    for (t, row) in record.t.iter().zip(&record.x) {
        model.scatter(row, *t)?;
        out.push(model.value(signal)?);
    }
    Ok(out)
}

fn replay(times: &[f64], values: &[f64], t: f64, path: &str) -> ModelResult<f64> {
    values
        .get(find_floor_index(t, times))
        .copied()
        .ok_or_else(|| {
            LookupError::EmptyHistory {
                path: path.to_string(),
            }
            .into()
        })
}

/// Sum of squared differences between tracked and fitted samples.
pub(crate) fn squared_error(tracked: &[Vec<f64>], fitted: &[Vec<f64>]) -> f64 {
    tracked
        .iter()
        .zip(fitted)
        .flat_map(|(a, b)| a.iter().zip(b))
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}
