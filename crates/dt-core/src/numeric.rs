use crate::{CoreError, CoreResult};

/// Floating point type used throughout the workspace.
pub type Real = f64;

/// Absolute/relative tolerance pair.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

/// True when `v` is zero up to the default absolute tolerance.
pub fn is_zero(v: Real) -> bool {
    nearly_equal(v, 0.0, Tolerances::default())
}

pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// `n` evenly spaced points on `[start, end]`, both ends included.
///
/// `n == 1` yields `[start]`, `n == 0` is rejected.
pub fn linspace(start: Real, end: Real, n: usize) -> CoreResult<Vec<Real>> {
    if n == 0 {
        return Err(CoreError::InvalidArg {
            what: "linspace needs at least one point",
        });
    }
    ensure_finite(start, "linspace start")?;
    ensure_finite(end, "linspace end")?;
    if n == 1 {
        return Ok(vec![start]);
    }
    let step = (end - start) / (n - 1) as Real;
    let mut out: Vec<Real> = (0..n).map(|i| start + step * i as Real).collect();
    // pin the last point so it is exactly `end`
    out[n - 1] = end;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn linspace_endpoints() {
        let pts = linspace(-1.0, 2.0, 4).unwrap();
        assert_eq!(pts, vec![-1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(3.0, 5.0, 1).unwrap(), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn linspace_is_monotone_and_bounded(
                start in -100.0f64..100.0,
                width in 0.0f64..50.0,
                n in 2usize..200,
            ) {
                let end = start + width;
                let pts = linspace(start, end, n).unwrap();
                prop_assert_eq!(pts.len(), n);
                prop_assert_eq!(pts[0], start);
                prop_assert_eq!(pts[n - 1], end);
                for w in pts.windows(2) {
                    prop_assert!(w[1] >= w[0]);
                }
            }
        }
    }
}
