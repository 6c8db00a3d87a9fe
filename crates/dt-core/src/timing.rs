//! Wall-clock timing of expensive phases.
//!
//! Stopwatches are inert unless timing is switched on with `set_timing`
//! or the `DT_TIMING` environment variable. The tracking loop uses them to
//! report how long each recalibration took.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_timing(on: bool) {
    ENABLED.store(on, Ordering::Relaxed);
}

pub fn timing_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var_os("DT_TIMING").is_some()
}

/// Measures one phase. Started disabled when timing is off.
#[derive(Debug)]
pub struct Stopwatch {
    label: &'static str,
    started: Option<Instant>,
}

impl Stopwatch {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: timing_enabled().then(Instant::now),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|s| s.elapsed())
    }

    /// Elapsed seconds, or `None` when timing was off at `start`.
    pub fn stop(self) -> Option<f64> {
        self.elapsed().map(|d| d.as_secs_f64())
    }
}

/// Count, total and worst case of a repeated phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseStats {
    count: u64,
    total: f64,
    max: f64,
}

impl PhaseStats {
    pub fn record(&mut self, seconds: f64) {
        self.count += 1;
        self.total += seconds;
        self.max = self.max.max(seconds);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total_seconds(&self) -> f64 {
        self.total
    }

    pub fn max_seconds(&self) -> f64 {
        self.max
    }

    /// Zero when nothing was recorded.
    pub fn mean_seconds(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_stats_track_mean_and_max() {
        let mut stats = PhaseStats::default();
        assert_eq!(stats.mean_seconds(), 0.0);
        stats.record(0.5);
        stats.record(1.5);
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.total_seconds(), 2.0);
        assert_eq!(stats.mean_seconds(), 1.0);
        assert_eq!(stats.max_seconds(), 1.5);
        stats.reset();
        assert_eq!(stats, PhaseStats::default());
    }

    #[test]
    fn enabled_stopwatch_reports_elapsed() {
        set_timing(true);
        let watch = Stopwatch::start("unit");
        assert_eq!(watch.label(), "unit");
        assert!(watch.elapsed().is_some());
        assert!(watch.stop().is_some_and(|s| s >= 0.0));
    }
}
