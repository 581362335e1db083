//! Small numeric helpers shared by the sampler and the chronology model.
//!
//! The tolerant comparison [`fcmp`] is load bearing: kernel proposals can land
//! exactly on admissibility boundaries, and a naive `<`/`>` test there makes
//! acceptance decisions flap with the last bit of rounding error.

use std::cmp::Ordering;

/// Default epsilon for tolerant float comparisons.
pub const DEFAULT_EPS: f64 = 1e-11;

/// Binary exponent of `x` as returned by C's `frexp`, so that
/// `x = m * 2^e` with `0.5 <= |m| < 1`.
fn exponent(x: f64) -> i32 {
    if x == 0.0 || !x.is_finite() {
        return 0;
    }
    let biased = ((x.to_bits() >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: fall back to the log, precision does not matter here.
        x.abs().log2().floor() as i32 + 1
    } else {
        biased - 1022
    }
}

/// Compare two floats up to a relative/absolute tolerance scaled by the
/// larger magnitude, using [`DEFAULT_EPS`].
pub fn fcmp(x: f64, y: f64) -> Ordering {
    fcmp_eps(x, y, DEFAULT_EPS)
}

/// Tolerant comparison with an explicit epsilon.
pub fn fcmp_eps(x: f64, y: f64, epsilon: f64) -> Ordering {
    let max = if x.abs() > y.abs() { x } else { y };
    let delta = epsilon * (exponent(max) as f64).exp2();
    let difference = x - y;
    if difference > delta {
        Ordering::Greater
    } else if difference < -delta {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// Componentwise tolerant equality of two equally sized slices.
pub fn approx_eq(v: &[f64], u: &[f64]) -> bool {
    v.iter().zip(u).all(|(&a, &b)| fcmp(a, b) == Ordering::Equal)
}

/// `out = a - b`, elementwise. All three slices must have the same length.
pub fn subtract(a: &[f64], b: &[f64], out: &mut [f64]) {
    debug_assert!(a.len() == b.len() && a.len() == out.len());
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

/// Index maximizing `mask[i] * |v[i]|`, ties broken by the first occurrence.
///
/// With an all-false mask every candidate value is zero and index 0 wins.
pub fn max_abs_masked(v: &[f64], mask: &[bool]) -> usize {
    debug_assert_eq!(v.len(), mask.len());
    let val = |i: usize| if mask[i] { v[i].abs() } else { 0.0 };
    let mut best = 0;
    for i in 0..v.len() {
        if fcmp(val(best), val(i)) == Ordering::Less {
            best = i;
        }
    }
    best
}
