//! Receding-horizon tracking of reference models.

use dt_models::{PlantConfig, forced_plant, mass_spring_damper_flat_with, msd_sine};
use dt_sim::{Driver, Phase, SimOptions, simulate};
use dt_track::{FailurePolicy, TrackError, TrackingBuilder, TrackingConfig, TrackingSimulator};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn settings() -> TrackingConfig {
    TrackingConfig {
        tolerance: 1e-3,
        horizon: 2.0,
        cooldown: 1.0,
        nsamples: 10,
        time_step: 0.01,
        xatol: 1e-3,
        fatol: 1e-6,
        ..TrackingConfig::default()
    }
}

/// Reference damping 1.0 (jumping to `after` at t = 10 when given), surrogate
/// starting from 0.3.
fn plant_tracker(after: Option<f64>, config: TrackingConfig) -> TrackingSimulator {
    let reference = forced_plant(PlantConfig {
        disturbance: after.map(|d| (10.0, d)),
        ..PlantConfig::default()
    })
    .unwrap();
    let surrogate = || {
        forced_plant(PlantConfig {
            damping: 0.3,
            ..PlantConfig::default()
        })
    };
    let mut b = TrackingBuilder::new(reference, surrogate, config).unwrap();
    b.match_signals("to_track.x", "tracking.x").unwrap();
    b.calibrate("d").unwrap();
    b.restore_from_reference("x", "to_track.x").unwrap();
    b.restore_from_reference("v", "to_track.v").unwrap();
    b.save().unwrap()
}

#[test]
fn surrogate_damping_converges_to_reference() {
    init_logging();
    dt_core::timing::set_timing(true);
    let mut sim = plant_tracker(None, settings());
    simulate(&mut sim, 0.0, 6.0, &SimOptions::with_max_step(0.01)).unwrap();
    assert_eq!(sim.recalibration_timing().count(), 1);

    let history = sim.recalibration_history();
    assert_eq!(history.len(), 1);
    let first = &history[0];
    assert!(first.t1 > 3.0 && first.t1 < 3.05, "t1 = {}", first.t1);
    assert!((first.t1 - first.t0 - 2.0).abs() < 0.02);
    assert_eq!(first.times.len(), 10);
    let d = first.parameter("d").unwrap();
    assert!((d - 1.0).abs() < 0.05, "d = {d}");
    assert_eq!(sim.parameter("d").unwrap(), d);

    assert!(sim.error().unwrap() < 1e-3);
}

#[test]
fn overridden_sample_matches_fitted_run() {
    let mut sim = plant_tracker(None, settings());
    simulate(&mut sim, 0.0, 3.5, &SimOptions::with_max_step(0.01)).unwrap();

    let rec = &sim.recalibration_history()[0];
    let m = sim.model();
    let x = m.find_signal("tracking.x").unwrap();
    let times = m.times(sim.surrogate()).unwrap();
    let i = times.iter().position(|&t| t == rec.t1).unwrap();
    let state = rec.final_state().unwrap();
    assert_eq!(m.history(x).unwrap()[i], state[0]);
    // histories keep their length through the override
    assert_eq!(m.history(x).unwrap().len(), times.len());
    assert_eq!(m.times(sim.reference()).unwrap().len(), times.len());
}

#[test]
fn follows_damping_disturbance() {
    init_logging();
    let mut sim = plant_tracker(Some(2.0), settings());
    simulate(&mut sim, 0.0, 20.0, &SimOptions::with_max_step(0.01)).unwrap();

    let history = sim.recalibration_history();
    assert!(history.len() >= 2, "{} recalibrations", history.len());
    assert!(history.iter().any(|r| r.t1 > 10.0));
    for pair in history.windows(2) {
        assert!(pair[1].t1 - pair[0].t1 > 3.0);
    }
    let d = sim.parameter("d").unwrap();
    assert!((d - 2.0).abs() < 0.05, "d = {d}");
    assert!(sim.error().unwrap() < 1e-3);
}

#[test]
fn wired_inputs_are_replayed_in_candidates() {
    init_logging();
    let config = TrackingConfig {
        cooldown: 3.0,
        ..settings()
    };
    let mut b = TrackingBuilder::new(
        msd_sine().unwrap(),
        || mass_spring_damper_flat_with(1.0, 0.4),
        config,
    )
    .unwrap();
    b.connect("tracking.F", "to_track.u.F").unwrap();
    b.match_signals("to_track.msd.x", "tracking.x").unwrap();
    b.calibrate("d").unwrap();
    b.restore_from_reference("x", "to_track.msd.x").unwrap();
    b.restore_from_reference("v", "to_track.msd.v").unwrap();
    let mut sim = b.save().unwrap();

    simulate(&mut sim, 0.0, 6.0, &SimOptions::with_max_step(0.01)).unwrap();
    let history = sim.recalibration_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].t1 > 5.0);
    let d = history[0].parameter("d").unwrap();
    assert!((d - 1.0).abs() < 0.05, "d = {d}");
    assert!(history[0].error < 1e-2);
}

#[test]
fn matched_var_is_fitted_between_candidate_commits() {
    init_logging();
    let reference = forced_plant(PlantConfig::default()).unwrap();
    let surrogate = || {
        forced_plant(PlantConfig {
            damping: 0.3,
            ..PlantConfig::default()
        })
    };
    // candidates commit every 0.01 while the live run commits every 0.005
    let mut b = TrackingBuilder::new(reference, surrogate, settings()).unwrap();
    b.match_signals("to_track.spring", "tracking.spring").unwrap();
    b.calibrate("d").unwrap();
    b.restore_from_reference("x", "to_track.x").unwrap();
    b.restore_from_reference("v", "to_track.v").unwrap();
    let mut sim = b.save().unwrap();

    simulate(&mut sim, 0.0, 3.5, &SimOptions::with_max_step(0.005)).unwrap();
    let history = sim.recalibration_history();
    assert_eq!(history.len(), 1);
    let d = history[0].parameter("d").unwrap();
    assert!((d - 1.0).abs() < 0.05, "d = {d}");
    assert!(history[0].error < 1e-4, "error = {}", history[0].error);
}

#[test]
fn non_convergence_aborts_by_default() {
    let config = TrackingConfig {
        max_iterations: Some(1),
        ..settings()
    };
    let mut sim = plant_tracker(None, config);
    let mut driver = Driver::new(&mut sim, SimOptions::with_max_step(0.01)).unwrap();
    let err = driver.run(0.0, 4.0).unwrap_err();
    assert!(matches!(err, TrackError::Calibration { .. }), "{err}");
    assert_eq!(driver.phase(), Phase::Failed);
}

#[test]
fn skip_cycle_keeps_running() {
    let config = TrackingConfig {
        max_iterations: Some(1),
        failure_policy: FailurePolicy::SkipCycle,
        ..settings()
    };
    let mut sim = plant_tracker(None, config);
    let record = simulate(&mut sim, 0.0, 4.0, &SimOptions::with_max_step(0.01)).unwrap();
    assert_eq!(record.t.last(), Some(&4.0));
    assert!(sim.recalibration_history().is_empty());
    assert!(sim.last_calibration_time() > 3.0);
    assert_eq!(sim.parameter("d").unwrap(), 0.3);
}

#[test]
fn reset_allows_a_second_run() {
    let mut sim = plant_tracker(None, settings());
    simulate(&mut sim, 0.0, 3.5, &SimOptions::with_max_step(0.01)).unwrap();
    assert!(simulate(&mut sim, 0.0, 1.0, &SimOptions::with_max_step(0.01)).is_err());

    sim.reset();
    assert!(sim.recalibration_history().is_empty());
    simulate(&mut sim, 0.0, 1.0, &SimOptions::with_max_step(0.01)).unwrap();
    assert_eq!(sim.last_calibration_time(), 0.0);
}

#[test]
fn config_loaded_from_yaml_drives_the_loop() {
    let config = TrackingConfig::from_yaml_str(
        "tolerance: 0.001\nhorizon: 2.0\ncooldown: 1.0\ntime_step: 0.01\nxatol: 0.001\nfatol: 0.000001\n",
    )
    .unwrap();
    assert_eq!(config, settings());
    let mut sim = plant_tracker(None, config);
    simulate(&mut sim, 0.0, 3.5, &SimOptions::with_max_step(0.01)).unwrap();
    assert_eq!(sim.recalibration_history().len(), 1);
}
