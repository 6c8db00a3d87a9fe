//! Composition of a tracking tree.
//!
//! The root holds the reference under `to_track` and a surrogate instance
//! under `tracking`, two parameters (`horizon`, `nsamples`) and one var,
//! `error`, the squared distance of every matched pair summed over the
//! horizon samples.

use dt_core::linspace;
use dt_model::{LookupError, ModelBuilder, ModelError, ModelResult, ParamRef, Scope, Signal};

use crate::config::TrackingConfig;
use crate::error::{TrackError, TrackResult};
use crate::simulator::TrackingSimulator;

/// Child name of the reference model.
pub const REFERENCE: &str = "to_track";
/// Child name of the live surrogate.
pub const SURROGATE: &str = "tracking";

/// Builds a fresh, unwired surrogate.
pub type SurrogateFactory = Box<dyn Fn() -> ModelResult<ModelBuilder>>;

/// A reference signal and the surrogate signal that should follow it.
#[derive(Clone, Debug)]
pub(crate) struct MatchedPair {
    pub reference: Signal,
    pub approximation: Signal,
    /// Path of `approximation` relative to the surrogate.
    pub local: String,
}

pub struct TrackingBuilder {
    root: ModelBuilder,
    horizon: ParamRef,
    nsamples: ParamRef,
    pairs: Vec<MatchedPair>,
    free: Vec<String>,
    restore: Vec<(String, Signal)>,
    factory: SurrogateFactory,
    config: TrackingConfig,
}

impl TrackingBuilder {
    /// Attach `reference` and one instance from `factory`.
    ///
    /// `factory` is called again for every recalibration candidate, so it
    /// must build the same structure each time.
    pub fn new<F>(reference: ModelBuilder, factory: F, config: TrackingConfig) -> TrackResult<Self>
    where
        F: Fn() -> ModelResult<ModelBuilder> + 'static,
    {
        config.validate()?;
        let surrogate = factory()?;
        let mut root = ModelBuilder::new();
        let horizon = root.parameter("horizon", config.horizon)?;
        let nsamples = root.parameter("nsamples", config.nsamples as f64)?;
        root.model(REFERENCE, reference)?;
        root.model(SURROGATE, surrogate)?;
        Ok(Self {
            root,
            horizon,
            nsamples,
            pairs: Vec::new(),
            free: Vec::new(),
            restore: Vec::new(),
            factory: Box::new(factory),
            config,
        })
    }

    /// Wire an input anywhere in the tree (paths from the root, e.g.
    /// `"tracking.F"` to `"to_track.u.F"`).
    ///
    /// Surrogate inputs wired here are replayed from their recorded history
    /// when a recalibration candidate is simulated.
    pub fn connect(&mut self, input: &str, target: &str) -> TrackResult<()> {
        let input = self.root.find_input(input)?;
        let target = self.root.find_signal(target)?;
        self.root.connect(input, target)?;
        Ok(())
    }

    /// Track `reference` (under `to_track`) with `approximation` (under
    /// `tracking`). Pairs keep their order; duplicates count twice.
    pub fn match_signals(&mut self, reference: &str, approximation: &str) -> TrackResult<()> {
        let local = surrogate_local(approximation).ok_or(TrackError::Config {
            what: "approximation must be a signal of the surrogate",
        })?;
        let pair = MatchedPair {
            reference: self.root.find_signal(reference)?,
            approximation: self.root.find_signal(approximation)?,
            local: local.to_string(),
        };
        self.pairs.push(pair);
        Ok(())
    }

    /// Let recalibration fit a surrogate parameter (path relative to the
    /// surrogate, e.g. `"d"`).
    pub fn calibrate(&mut self, param: &str) -> TrackResult<()> {
        self.root.find_param(&format!("{SURROGATE}.{param}"))?;
        if self.free.iter().any(|p| p == param) {
            return Err(ModelError::Duplicate {
                name: param.to_string(),
            }
            .into());
        }
        self.free.push(param.to_string());
        Ok(())
    }

    /// Start candidates with surrogate state `state` (relative path) taken
    /// from the reference signal `signal` instead of the surrogate's own
    /// history.
    pub fn restore_from_reference(&mut self, state: &str, signal: &str) -> TrackResult<()> {
        self.root.find_state(&format!("{SURROGATE}.{state}"))?;
        let signal = self.root.find_signal(signal)?;
        self.restore.push((state.to_string(), signal));
        Ok(())
    }

    pub fn save(mut self) -> TrackResult<TrackingSimulator> {
        if self.pairs.is_empty() {
            return Err(TrackError::Config {
                what: "no matched signals",
            });
        }
        if self.free.is_empty() {
            return Err(TrackError::Config {
                what: "no parameters to calibrate",
            });
        }

        let pairs: Vec<(Signal, Signal)> = self
            .pairs
            .iter()
            .map(|p| (p.reference, p.approximation))
            .collect();
        let (horizon, nsamples) = (self.horizon, self.nsamples);
        let error = self
            .root
            .var("error", move |s| horizon_error(s, &pairs, horizon, nsamples))?;

        let model = self.root.save()?;
        let reference = model.find_node(REFERENCE)?;
        let surrogate = model.find_node(SURROGATE)?;
        let free = self
            .free
            .into_iter()
            .map(|name| {
                let p = model.find_param(&format!("{SURROGATE}.{name}"))?;
                Ok((name, p))
            })
            .collect::<ModelResult<Vec<_>>>()?;
        tracing::debug!(
            pairs = self.pairs.len(),
            free = free.len(),
            restored = self.restore.len(),
            "tracking tree frozen"
        );

        Ok(TrackingSimulator {
            model,
            reference,
            surrogate,
            error,
            horizon: self.horizon,
            nsamples: self.nsamples,
            pairs: self.pairs,
            free,
            restore: self.restore,
            factory: self.factory,
            config: self.config,
            last_calibration: 0.0,
            in_recalibration: false,
            history: Vec::new(),
            timing: Default::default(),
        })
    }
}

fn surrogate_local(path: &str) -> Option<&str> {
    path.strip_prefix(SURROGATE)?
        .strip_prefix('.')
        .filter(|rest| !rest.is_empty())
}

/// Sum of squared pair differences at `nsamples` points on
/// `[max(0, t - horizon), t]`.
fn horizon_error(
    s: &Scope<'_>,
    pairs: &[(Signal, Signal)],
    horizon: ParamRef,
    nsamples: ParamRef,
) -> ModelResult<f64> {
    let t = s.time();
    let start = (t - s.param(horizon)?).max(0.0);
    let samples = linspace(start, t, s.param(nsamples)? as usize)?;
    let mut sum = 0.0;
    for &(reference, approximation) in pairs {
        for &tau in &samples {
            let d = tau - t;
            let diff = delayed_or_live(s, reference, d)? - delayed_or_live(s, approximation, d)?;
            sum += diff * diff;
        }
    }
    Ok(sum)
}

/// Delayed read that falls back to the live value before the first sample
/// has been recorded.
fn delayed_or_live(s: &Scope<'_>, signal: Signal, d: f64) -> ModelResult<f64> {
    match s.delayed(signal, d) {
        Err(ModelError::Lookup(LookupError::EmptyHistory { .. })) => s.value(signal),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f64) -> ModelResult<ModelBuilder> {
        let mut b = ModelBuilder::new();
        let x = b.state("x", value)?;
        b.parameter("a", 0.0)?;
        b.input("u", 0.0)?;
        b.der(x, |_| Ok(0.0))?;
        Ok(b)
    }

    fn builder() -> TrackingBuilder {
        TrackingBuilder::new(
            constant(1.0).unwrap(),
            || constant(0.0),
            TrackingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn surrogate_paths() {
        assert_eq!(surrogate_local("tracking.x"), Some("x"));
        assert_eq!(surrogate_local("tracking.md.x"), Some("md.x"));
        assert_eq!(surrogate_local("tracking."), None);
        assert_eq!(surrogate_local("trackingx"), None);
        assert_eq!(surrogate_local("to_track.x"), None);
    }

    #[test]
    fn save_requires_pairs_and_parameters() {
        let b = builder();
        assert!(matches!(b.save(), Err(TrackError::Config { .. })));

        let mut b = builder();
        b.match_signals("to_track.x", "tracking.x").unwrap();
        assert!(matches!(b.save(), Err(TrackError::Config { .. })));
    }

    #[test]
    fn declarations_are_validated() {
        let mut b = builder();
        assert!(matches!(
            b.match_signals("to_track.x", "to_track.x"),
            Err(TrackError::Config { .. })
        ));
        assert!(matches!(
            b.match_signals("to_track.nope", "tracking.x"),
            Err(TrackError::Model(ModelError::UnknownSignal { .. }))
        ));
        b.calibrate("a").unwrap();
        assert!(matches!(
            b.calibrate("a"),
            Err(TrackError::Model(ModelError::Duplicate { .. }))
        ));
        assert!(b.calibrate("x").is_err());
        assert!(b.restore_from_reference("a", "to_track.x").is_err());
        b.restore_from_reference("x", "to_track.x").unwrap();
        b.connect("tracking.u", "to_track.x").unwrap();
        assert!(matches!(
            b.connect("tracking.u", "to_track.x"),
            Err(TrackError::Model(ModelError::AlreadyWired { .. }))
        ));
    }

    #[test]
    fn error_sums_pairs_over_samples() {
        let mut b = builder();
        b.match_signals("to_track.x", "tracking.x").unwrap();
        b.match_signals("to_track.x", "tracking.x").unwrap();
        b.calibrate("a").unwrap();
        let mut sim = b.save().unwrap();
        sim.model_mut().commit(0.0).unwrap();
        // both pairs differ by 1 at each of the 10 samples
        assert_eq!(sim.error().unwrap(), 20.0);
        let root = sim.model().signals(sim.model().root()).unwrap();
        assert_eq!(root.get("error"), Some(&[20.0][..]));
    }
}
