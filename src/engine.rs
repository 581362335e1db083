//! The self-adjusting two-point Metropolis sampler (t-walk).
//!
//! The engine keeps two walkers `x` and `xp` that both satisfy the model's
//! admissibility predicate at all times outside the brief window in which a
//! proposal is generated and tested. Each iteration picks one of the five
//! proposal kernels, one walker as the pivot, an active-coordinate subset
//! and the auxiliary `beta`, then accepts or rejects a proposal for the
//! other walker through the Metropolis ratio with kernel-specific bias
//! terms. No tuning is required; the two-point construction is what makes
//! the sampler self-adjusting.

use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;

use crate::kernel::{sim_beta, Bias, Kernel, Scratch, EXPECTED_MOVED, TRAVERSE_AT};
use crate::math::fcmp;
use crate::objective::Objective;
use crate::trace::TraceSink;

/// Seconds between the first pair of progress notices; the interval backs
/// off exponentially afterwards.
const NOTICE_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("initial point {which} out of support: {point:?}")]
    OutOfSupport { which: &'static str, point: Vec<f64> },
    #[error("objective has dimension {expected}, initial point has {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("trace sink error")]
    Trace(#[from] std::io::Error),
}

/// Outcome of one Metropolis iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// The proposal replaced walker `x`.
    AcceptedX,
    /// The proposal replaced walker `xp`.
    AcceptedXp,
    /// State unchanged.
    Rejected,
}

/// What happened in one call to [`Twalk::step`].
#[derive(Debug, Clone, Copy)]
pub struct StepInfo {
    pub result: Move,
    pub kernel: Kernel,
    /// Fraction of coordinates selected by the active mask this step.
    pub moved_fraction: f64,
}

/// Saving cadence and reporting controls for [`Twalk::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Total number of iterations, at least 1.
    pub draws: u64,
    /// `< 0`: save every `|save_every|`-th accepted move only. `> 0`: save
    /// every `save_every`-th iteration regardless of acceptance. `0`: save
    /// every iteration and emit per-step kernel diagnostics to the sink.
    pub save_every: i64,
    /// Suppress progress notices on stderr.
    pub silent: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            draws: 100_000,
            save_every: 1,
            silent: false,
        }
    }
}

/// Summary statistics of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub iterations: u64,
    pub accepted: u64,
    /// Accepted iterations over total iterations.
    pub accepted_fraction: f64,
    /// Mean fraction of coordinates moved per iteration, counting
    /// rejections as zero.
    pub mean_moved_fraction: f64,
}

/// The t-walk sampler around a borrowed objective.
///
/// The engine owns its walkers and all scratch memory; the model stays
/// owned by the caller and is only borrowed for the engine's lifetime.
#[derive(Debug)]
pub struct Twalk<'a, O: Objective> {
    obj: &'a mut O,
    n: usize,
    x: Vec<f64>,
    xp: Vec<f64>,
    u: f64,
    up: f64,
    // Proposal pair under evaluation.
    y: Vec<f64>,
    yp: Vec<f64>,
    scratch: Scratch,
    mask: Vec<bool>,
    p_active: f64,
    map_x: Vec<f64>,
    map_u: f64,
    accepted: u64,
    steps: u64,
    moved_sum: f64,
}

fn select_kernel(u: f64) -> Kernel {
    // Fixed cumulative weights: traverse and walk dominate, hop and blow
    // are rare jump moves, the identity kernel is disabled.
    if u < 0.0082 {
        Kernel::Hop
    } else if u < 0.0164 {
        Kernel::Blow
    } else if u < 0.5082 {
        Kernel::Traverse
    } else {
        Kernel::Walk
    }
}

impl<'a, O: Objective> Twalk<'a, O> {
    /// Build the engine around two admissible starting points.
    ///
    /// An inadmissible starting point is fatal: sampling must not proceed
    /// and the offending coordinates are reported in the error.
    pub fn new(obj: &'a mut O, x0: &[f64], xp0: &[f64]) -> Result<Self, EngineError> {
        let n = obj.dim();
        for point in [x0, xp0] {
            if point.len() != n {
                return Err(EngineError::DimensionMismatch {
                    expected: n,
                    got: point.len(),
                });
            }
        }

        if !obj.is_admissible(x0) {
            return Err(EngineError::OutOfSupport {
                which: "x",
                point: x0.to_vec(),
            });
        }
        let u = obj.energy(x0, false);

        if !obj.is_admissible(xp0) {
            return Err(EngineError::OutOfSupport {
                which: "xp",
                point: xp0.to_vec(),
            });
        }
        let up = obj.energy(xp0, true);

        let p_active = EXPECTED_MOVED.min(n) as f64 / n as f64;

        Ok(Twalk {
            obj,
            n,
            x: x0.to_vec(),
            xp: xp0.to_vec(),
            u,
            up,
            y: x0.to_vec(),
            yp: xp0.to_vec(),
            scratch: Scratch::new(n),
            mask: vec![false; n],
            p_active,
            map_x: x0.to_vec(),
            map_u: u,
            accepted: 0,
            steps: 0,
            moved_sum: 0.0,
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn xp(&self) -> &[f64] {
        &self.xp
    }

    pub fn energy(&self) -> f64 {
        self.u
    }

    pub fn energy_primed(&self) -> f64 {
        self.up
    }

    /// Lowest-energy point seen so far on walker `x`.
    pub fn map_point(&self) -> (&[f64], f64) {
        (&self.map_x, self.map_u)
    }

    /// Iterations stepped over the engine's lifetime, across `run` calls.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Accepted proposals over the engine's lifetime.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Mean fraction of coordinates moved per iteration over the engine's
    /// lifetime, counting rejections as zero.
    pub fn mean_moved_fraction(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.moved_sum / self.steps as f64
        }
    }

    fn draw_mask<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let mut nphi = 0;
        for slot in self.mask.iter_mut() {
            *slot = rng.random::<f64>() < self.p_active;
            nphi += usize::from(*slot);
        }
        nphi
    }

    /// One Metropolis iteration.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> StepInfo {
        let kernel = select_kernel(rng.random());
        let dir: f64 = rng.random();
        let nphi = self.draw_mask(rng);
        let beta = sim_beta(rng, TRAVERSE_AT);

        let x_is_pivot = dir < 0.5;
        let (prop_u, prop_up, acceptance) = if x_is_pivot {
            // xp moves; yp is the proposal.
            kernel.propose(rng, &self.xp, &self.x, beta, &self.mask, &mut self.scratch);
            self.yp.copy_from_slice(&self.scratch.proposal);
            self.y.copy_from_slice(&self.x);
            let a = if self.obj.is_admissible(&self.yp) {
                let prop_up = self.obj.energy(&self.yp, true);
                let sigma = self.scratch.sigma;
                let w1 = kernel.bias(&self.yp, &self.xp, &self.x, sigma);
                let w2 = kernel.bias(&self.xp, &self.yp, &self.x, sigma);
                Some((
                    prop_up,
                    acceptance_probability(self.u, self.u, self.up, prop_up, w1, w2, nphi, beta),
                ))
            } else {
                None
            };
            match a {
                Some((prop_up, a)) => (self.u, prop_up, a),
                None => (self.u, self.up, 0.0),
            }
        } else {
            // x moves; y is the proposal.
            kernel.propose(rng, &self.x, &self.xp, beta, &self.mask, &mut self.scratch);
            self.y.copy_from_slice(&self.scratch.proposal);
            self.yp.copy_from_slice(&self.xp);
            let a = if self.obj.is_admissible(&self.y) {
                let prop_u = self.obj.energy(&self.y, false);
                let sigma = self.scratch.sigma;
                let w1 = kernel.bias(&self.y, &self.x, &self.xp, sigma);
                let w2 = kernel.bias(&self.x, &self.y, &self.xp, sigma);
                Some((
                    prop_u,
                    acceptance_probability(self.u, prop_u, self.up, self.up, w1, w2, nphi, beta),
                ))
            } else {
                None
            };
            match a {
                Some((prop_u, a)) => (prop_u, self.up, a),
                None => (self.u, self.up, 0.0),
            }
        };

        self.steps += 1;
        let moved_fraction = nphi as f64 / self.n as f64;

        // A non-finite ratio (degenerate proposal) fails the comparison and
        // is absorbed as an ordinary rejection.
        let result = if rng.random::<f64>() < acceptance {
            self.moved_sum += moved_fraction;
            self.accepted += 1;
            self.x.copy_from_slice(&self.y);
            self.u = prop_u;
            self.xp.copy_from_slice(&self.yp);
            self.up = prop_up;

            if x_is_pivot {
                self.obj.accepted(true);
                Move::AcceptedXp
            } else {
                self.obj.accepted(false);
                if fcmp(self.u, self.map_u) == std::cmp::Ordering::Less {
                    self.map_u = self.u;
                    self.map_x.copy_from_slice(&self.x);
                }
                Move::AcceptedX
            }
        } else {
            self.obj.rejected(x_is_pivot);
            Move::Rejected
        };

        StepInfo {
            result,
            kernel,
            moved_fraction,
        }
    }

    /// Run `opts.draws` iterations, emitting saved states to `sink` per the
    /// cadence policy and progress notices to stderr unless silent.
    pub fn run<R: Rng + ?Sized, S: TraceSink>(
        &mut self,
        rng: &mut R,
        sink: &mut S,
        opts: RunOptions,
    ) -> Result<RunSummary, EngineError> {
        let draws = opts.draws.max(1);
        let debug = opts.save_every == 0;
        let save_every = if debug { 1 } else { opts.save_every };

        let start = Instant::now();
        if !opts.silent {
            eprintln!("twalk: {draws} iterations to run");
            if save_every < 0 {
                eprintln!(
                    "twalk: thinning, 1 out of every {} accepted iterations will be saved",
                    save_every.unsigned_abs()
                );
            }
        }

        let mut accepted_here = 0u64;
        let mut moved_here = 0.0f64;
        let mut last_notice = Instant::now();
        // Time is checked at exponentially spaced iteration counts, capped
        // at every 1024 iterations; the notice interval itself backs off.
        let mut check_shift: u32 = 1;
        let mut notice_shift: u32 = 0;

        for it in 1..=draws {
            let info = self.step(rng);
            match info.result {
                Move::Rejected => {
                    if debug {
                        sink.diagnostic(info.kernel, 0.0)?;
                    }
                }
                _ => {
                    accepted_here += 1;
                    moved_here += info.moved_fraction;
                    if save_every < 0 && accepted_here % save_every.unsigned_abs() == 0 {
                        sink.append(&self.x, self.u)?;
                    }
                    if debug {
                        sink.diagnostic(info.kernel, info.moved_fraction)?;
                    }
                }
            }

            if save_every > 0 && it % save_every.unsigned_abs() == 0 {
                sink.append(&self.x, self.u)?;
            }

            if it % (1u64 << check_shift) == 0 {
                check_shift = (check_shift + 1).min(10);
                let wait = Duration::from_secs((1u64 << notice_shift) * NOTICE_SECS);
                if last_notice.elapsed() > wait {
                    if !opts.silent {
                        eprintln!("twalk: {it} iterations so far. {}", eta(draws, it, start));
                    }
                    last_notice = Instant::now();
                    notice_shift += 1;
                    check_shift -= 1;
                }
            }
        }

        let summary = RunSummary {
            iterations: draws,
            accepted: accepted_here,
            accepted_fraction: accepted_here as f64 / draws as f64,
            mean_moved_fraction: moved_here / draws as f64,
        };
        if !opts.silent {
            eprintln!(
                "twalk: finished, {:.1}% of moved coordinates per iteration ({}/{} accepted)",
                100.0 * summary.mean_moved_fraction,
                summary.accepted,
                summary.iterations,
            );
        }
        Ok(summary)
    }
}

/// Human-readable estimated time remaining.
fn eta(total: u64, it: u64, start: Instant) -> String {
    let per_iter = start.elapsed().as_secs_f64() / it as f64;
    let remain = ((total - it) as f64 * per_iter) as u64;
    if remain == 0 {
        String::new()
    } else if remain < 60 {
        format!("Will finish in approx. {remain} seconds.")
    } else if remain <= 360 {
        format!(
            "Will finish in approx. {} minutes and {} seconds.",
            remain / 60,
            remain % 60
        )
    } else {
        format!(
            "Will finish in approx. {:.1} hours.",
            remain as f64 / 3600.0
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn acceptance_probability(
    u: f64,
    prop_u: f64,
    up: f64,
    prop_up: f64,
    w1: Bias,
    w2: Bias,
    nphi: usize,
    beta: f64,
) -> f64 {
    let energy_gain = (u - prop_u) + (up - prop_up);
    match (w1, w2) {
        (Bias::NotReversible, _) | (_, Bias::NotReversible) => 0.0,
        (Bias::SelfSymmetric, Bias::SelfSymmetric) => {
            (energy_gain + (nphi as f64 - 2.0) * beta.ln()).exp()
        }
        (Bias::LogDensity(a), Bias::LogDensity(b)) => (energy_gain + (a - b)).exp(),
        // A kernel never mixes a self-symmetric and a density term within
        // one step; force rejection if it somehow does.
        _ => 0.0,
    }
}
