//! Self-adjusting two-walker MCMC and a piecewise-linear age-depth model
//! built on top of it.
//!
//! The sampler half is a general-purpose engine: implement [`Objective`]
//! for a negative-log-density with a support check and hand [`Twalk`] two
//! distinct starting points. The chronology half models sediment ages as
//! cumulative sums of per-section accumulation rates with an
//! autoregressive memory prior, optional hiatuses, and calibrated dated
//! samples; see [`AgeDepthModel`].
//!
//! ```no_run
//! use agedepth::{Objective, RunOptions, Twalk};
//! use agedepth::trace::MemTrace;
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//!
//! struct Normal;
//!
//! impl Objective for Normal {
//!     fn dim(&self) -> usize {
//!         1
//!     }
//!     fn is_admissible(&mut self, _x: &[f64]) -> bool {
//!         true
//!     }
//!     fn energy(&mut self, x: &[f64], _prime: bool) -> f64 {
//!         0.5 * x[0] * x[0]
//!     }
//! }
//!
//! let mut model = Normal;
//! let mut sampler = Twalk::new(&mut model, &[1.5], &[-0.5])?;
//! let mut rng = SmallRng::seed_from_u64(1);
//! let mut trace = MemTrace::new();
//! let summary = sampler.run(&mut rng, &mut trace, RunOptions::default())?;
//! println!("accepted {:.1}%", 100.0 * summary.accepted_fraction);
//! # Ok::<(), agedepth::EngineError>(())
//! ```

pub mod agedepth;
pub mod calibration;
pub mod determination;
pub mod engine;
pub mod kernel;
pub mod math;
pub mod objective;
pub mod parallel;
pub mod trace;

pub use agedepth::{AgeDepthConfig, AgeDepthModel, ModelError, Segment};
pub use calibration::{Curve, CurveError, CurveTable};
pub use determination::{Determination, Determinations};
pub use engine::{EngineError, Move, RunOptions, RunSummary, StepInfo, Twalk};
pub use kernel::{Bias, Kernel, Scratch};
pub use objective::Objective;
pub use parallel::{run_chains, ChainRun, ChainSpec};
pub use trace::{MemTrace, TextTrace, TraceSink};
