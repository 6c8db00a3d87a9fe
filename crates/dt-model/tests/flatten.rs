use dt_model::{Model, ModelBuilder, ModelError};
use proptest::prelude::*;

/// Root with `n_root` states and two children with `n_child` states each.
fn nested(n_root: usize, n_child: usize) -> Model {
    fn leaf(n: usize, offset: f64) -> ModelBuilder {
        let mut b = ModelBuilder::new();
        for i in 0..n {
            let s = b.state(&format!("s{i}"), offset + i as f64).unwrap();
            b.der(s, move |sc| Ok(-sc.value(s)?)).unwrap();
        }
        b
    }
    let mut root = leaf(n_root, 0.0);
    root.model("left", leaf(n_child, 100.0)).unwrap();
    root.model("right", leaf(n_child, 200.0)).unwrap();
    root.save().unwrap()
}

#[test]
fn reset_restores_initials_and_empties_histories() {
    let mut m = nested(2, 1);
    let initial = m.flatten_state();
    m.commit(0.0).unwrap();
    m.scatter(&[9.0, 9.0, 9.0, 9.0], 1.0).unwrap();
    m.commit(1.0).unwrap();
    assert_eq!(m.sample_count(m.root()).unwrap(), 2);

    m.reset();
    assert_eq!(m.flatten_state(), initial);
    assert_eq!(m.time(), 0.0);
    for path in ["", "left", "right"] {
        let node = m.find_node(path).unwrap();
        let signals = m.signals(node).unwrap();
        assert!(signals.time().is_empty());
        for name in signals.names() {
            assert!(signals[name].is_empty(), "{path}.{name} not cleared");
        }
    }
}

#[test]
fn child_states_follow_parent_states() {
    let m = nested(1, 2);
    assert_eq!(m.flatten_state(), vec![0.0, 100.0, 101.0, 200.0, 201.0]);
    assert_eq!(m.state_index("right.s1").unwrap(), 4);
    let right = m.find_node("right").unwrap();
    assert_eq!(m.state_range(right).unwrap(), 3..5);
}

#[test]
fn scatter_rejects_wrong_length() {
    let mut m = nested(1, 1);
    let err = m.scatter(&[1.0, 2.0], 0.0).unwrap_err();
    assert!(matches!(
        err,
        ModelError::LengthMismatch {
            expected: 3,
            got: 2,
            ..
        }
    ));
}

proptest! {
    #[test]
    fn state_count_matches_flat_length(n_root in 0usize..4, n_child in 0usize..4) {
        let m = nested(n_root, n_child);
        prop_assert_eq!(m.state_count(), m.flatten_state().len());
        prop_assert_eq!(m.state_count(), n_root + 2 * n_child);
    }

    #[test]
    fn scatter_then_flatten_round_trips(
        n_root in 0usize..4,
        n_child in 0usize..4,
        seed in proptest::collection::vec(-1e6f64..1e6, 12),
        t in 0.0f64..100.0,
    ) {
        let mut m = nested(n_root, n_child);
        let y: Vec<f64> = seed.into_iter().take(m.state_count()).collect();
        m.scatter(&y, t).unwrap();
        prop_assert_eq!(m.flatten_state(), y);
        prop_assert_eq!(m.time(), t);
    }

    #[test]
    fn derivatives_use_scattered_state(
        y in proptest::collection::vec(-10.0f64..10.0, 5),
    ) {
        let mut m = nested(1, 2);
        let mut out = vec![0.0; 5];
        m.derivatives(0.0, &y, &mut out).unwrap();
        for (d, v) in out.iter().zip(&y) {
            prop_assert_eq!(*d, -*v);
        }
    }
}
