//! Proposal kernels of the t-walk sampler.
//!
//! The t-walk draws one of five proposal strategies per iteration. Each
//! kernel is a pure rule over the walker being moved and the pivot walker
//! held fixed; working memory (the proposal buffer, the displacement buffer
//! and the hop/blow step size) is owned by the engine and handed in per call
//! through [`Scratch`], so no kernel retains state between invocations.
//!
//! See Christen & Fox (2010), "A general purpose sampling algorithm for
//! continuous distributions (the t-walk)", Bayesian Analysis 5(2).

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;

use crate::math::{approx_eq, max_abs_masked, subtract};

/// Traverse parameter `a_t` of the auxiliary density `f_a(beta)`.
pub const TRAVERSE_AT: f64 = 6.0;

/// Walk parameter `a_w` of the bounded auxiliary variable.
pub const WALK_AW: f64 = 1.5;

/// Expected number of coordinates moved per iteration (`n_1` in the paper).
pub const EXPECTED_MOVED: usize = 4;

/// One of the five proposal strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Returns the moved walker unchanged. Inert, retained for completeness;
    /// its selection weight is zero.
    Identity,
    /// `h = pivot + beta * (pivot - current)` on the active coordinates.
    Traverse,
    /// `h = current + (current - pivot) * phi2` on the active coordinates.
    Walk,
    /// Isotropic jump around the current walker, scaled to a third of the
    /// largest active displacement between the walkers.
    Hop,
    /// Jump around the pivot, scaled to the full largest active displacement.
    Blow,
}

/// Acceptance-bias contribution of a kernel.
///
/// Classic t-walk codes encode the two non-density outcomes as the float
/// sentinels `-1` and `-2`; they are distinct variants here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bias {
    /// The kernel cannot produce the reverse move from this configuration;
    /// the proposal must be rejected.
    NotReversible,
    /// The kernel is self-symmetric: its contribution cancels analytically
    /// and the acceptance ratio instead takes the closed-form
    /// `(nphi - 2) * ln(beta)` correction.
    SelfSymmetric,
    /// An ordinary log-density term entering the ratio as `W1 - W2`.
    LogDensity(f64),
}

/// Per-call working memory for kernel proposals, owned by the engine.
#[derive(Debug)]
pub struct Scratch {
    /// Proposal under construction.
    pub proposal: Vec<f64>,
    /// Displacement `pivot - current`, used by hop and blow.
    pub diff: Vec<f64>,
    /// Step size set by the latest hop/blow proposal; the matching bias
    /// evaluation must use this same value.
    pub sigma: f64,
}

impl Scratch {
    pub fn new(dim: usize) -> Self {
        Scratch {
            proposal: vec![0.0; dim],
            diff: vec![0.0; dim],
            sigma: 0.0,
        }
    }
}

/// Draw `beta` from the power-law auxiliary density `f_a(beta)`.
///
/// Always consumes two independent uniforms, keeping the random-stream
/// layout fixed for seeded runs.
pub fn sim_beta<R: Rng + ?Sized>(rng: &mut R, at: f64) -> f64 {
    let u: f64 = rng.random();
    let v: f64 = rng.random();
    if u < (at - 1.0) / (2.0 * at) {
        (v.ln() / (at + 1.0)).exp()
    } else {
        (v.ln() / (1.0 - at)).exp()
    }
}

/// Draw the bounded symmetric auxiliary variable of the walk kernel.
pub fn sim_phi2<R: Rng + ?Sized>(rng: &mut R, aw: f64) -> f64 {
    let u: f64 = rng.random();
    (aw / (1.0 + aw)) * (-1.0 + 2.0 * u + aw * u * u)
}

impl Kernel {
    /// Generate a proposal for `current` with `pivot` held fixed, writing it
    /// into `scratch.proposal`. Hop and blow also record their step size in
    /// `scratch.sigma` for the paired [`Kernel::bias`] calls.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current: &[f64],
        pivot: &[f64],
        beta: f64,
        mask: &[bool],
        scratch: &mut Scratch,
    ) {
        let n = current.len();
        match self {
            Kernel::Identity => scratch.proposal.copy_from_slice(current),
            Kernel::Traverse => {
                for i in 0..n {
                    scratch.proposal[i] = if mask[i] {
                        pivot[i] + beta * (pivot[i] - current[i])
                    } else {
                        current[i]
                    };
                }
            }
            Kernel::Walk => {
                // The auxiliary variable is drawn for every coordinate, also
                // the inactive ones, to keep a fixed random-stream layout.
                for i in 0..n {
                    let z = sim_phi2(rng, WALK_AW);
                    scratch.proposal[i] = if mask[i] {
                        current[i] + (current[i] - pivot[i]) * z
                    } else {
                        current[i]
                    };
                }
            }
            Kernel::Hop => {
                subtract(pivot, current, &mut scratch.diff);
                let i = max_abs_masked(&scratch.diff, mask);
                scratch.sigma = scratch.diff[i].abs() / 3.0;
                for j in 0..n {
                    let z: f64 = rng.sample(StandardNormal);
                    scratch.proposal[j] = if mask[j] {
                        current[j] + scratch.sigma * z
                    } else {
                        current[j]
                    };
                }
            }
            Kernel::Blow => {
                subtract(pivot, current, &mut scratch.diff);
                let i = max_abs_masked(&scratch.diff, mask);
                scratch.sigma = scratch.diff[i].abs();
                for j in 0..n {
                    scratch.proposal[j] = if mask[j] {
                        let z: f64 = rng.sample(StandardNormal);
                        pivot[j] + scratch.sigma * z
                    } else {
                        current[j]
                    };
                }
            }
        }
    }

    /// Acceptance-bias term for the move `other -> h` with `pivot` fixed.
    ///
    /// For hop and blow, `sigma` must be the step size produced by the
    /// proposal this bias term is paired with.
    pub fn bias(&self, h: &[f64], other: &[f64], pivot: &[f64], sigma: f64) -> Bias {
        match self {
            Kernel::Identity => {
                if approx_eq(h, other) {
                    Bias::LogDensity(1.0)
                } else {
                    Bias::LogDensity(0.0)
                }
            }
            Kernel::Traverse => Bias::SelfSymmetric,
            Kernel::Walk => Bias::LogDensity(1.0),
            Kernel::Hop => {
                // A hop between coincident walkers has no reverse move.
                if approx_eq(other, pivot) {
                    Bias::NotReversible
                } else {
                    Bias::LogDensity(gaussian_term(h, pivot, sigma))
                }
            }
            Kernel::Blow => Bias::LogDensity(gaussian_term(h, pivot, sigma)),
        }
    }
}

/// Negative log density of an isotropic Gaussian at `h` centered on `pivot`.
fn gaussian_term(h: &[f64], pivot: &[f64], sigma: f64) -> f64 {
    let n = h.len() as f64;
    let sq_dist: f64 = h
        .iter()
        .zip(pivot)
        .map(|(&a, &b)| (a - b) * (a - b))
        .sum();
    0.5 * n * (2.0 * PI).ln() + n * sigma.ln() + 0.5 * sq_dist / (sigma * sigma)
}
