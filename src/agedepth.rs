//! The piecewise-linear accumulation-rate chronology model.
//!
//! The parameter vector has dimension `K + 2`: the age at the top of the
//! core, one accumulation rate per section, and the memory weight `w` that
//! couples adjacent sections through the inverted recurrence
//! `e_k = (rate_k - w * rate_{k+1}) / (1 - w)`. Optional hiatuses split the
//! core into depositional regimes with their own accumulation and jump
//! priors; inside a hiatus-crossing section the bare rate replaces the
//! memory recurrence.
//!
//! Section ages (`theta`) are derived state: [`AgeDepthModel::is_admissible`]
//! recomputes them for the candidate vector through an explicit helper, and
//! [`AgeDepthModel::energy`] and [`AgeDepthModel::age_at`] read that buffer.
//! The engine guarantees the admissibility check directly precedes every
//! energy evaluation.

use std::cmp::Ordering;

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};
use thiserror::Error;

use crate::determination::Determinations;
use crate::math::fcmp;
use crate::objective::Objective;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("the model needs at least one section")]
    NoSections,
    #[error("bottom depth {bottom} must lie below top depth {top}")]
    InvalidSpan { top: f64, bottom: f64 },
    #[error("expected {expected} depositional segments for {hiatuses} hiatuses, got {got}")]
    SegmentCount {
        expected: usize,
        got: usize,
        hiatuses: usize,
    },
    #[error(
        "hiatus {index} at depth {depth} is not at least one section width \
         above the previous breakpoint ({limit})"
    )]
    HiatusOrder { index: usize, depth: f64, limit: f64 },
    #[error("the deepest-to-shallowest hiatus at depth {depth} does not lie above the top {top}")]
    HiatusAboveTop { depth: f64, top: f64 },
    #[error("the model needs at least one dated sample")]
    NoDeterminations,
    #[error("sample {label:?} at depth {depth} lies outside the core span [{top}, {bottom}]")]
    DepthOutOfRange {
        label: String,
        depth: f64,
        top: f64,
        bottom: f64,
    },
    #[error("invalid prior shape parameters: {0}")]
    Prior(String),
}

/// Prior shape parameters of one depositional regime.
///
/// `acc_*` parameterize the Gamma prior on per-section residual rates,
/// `jump_*` the Gamma prior on the rate inside a hiatus-crossing section.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub acc_shape: f64,
    pub acc_rate: f64,
    pub jump_shape: f64,
    pub jump_rate: f64,
}

/// Construction parameters for [`AgeDepthModel`].
#[derive(Debug, Clone)]
pub struct AgeDepthConfig {
    /// Number of equal-width sections `K`.
    pub sections: usize,
    /// Depth of the top of the core, `c(0)`.
    pub top_depth: f64,
    /// Depth of the bottom of the core, `c(K)`.
    pub bottom_depth: f64,
    /// Beta prior shape parameters for the memory weight `w`.
    pub mem_a: f64,
    pub mem_b: f64,
    /// Plausible calendar-age bounds; ages drifting past them are counted
    /// as soft warnings (and the low side is inadmissible).
    pub min_age: f64,
    pub max_age: f64,
    /// Use the Student-t observation model instead of the normal one.
    pub student_t: bool,
    /// Initial top ages for the two walkers.
    pub age_guess: (f64, f64),
    /// Hiatus depths, strictly decreasing, each strictly inside the core
    /// span and at least one section width below the previous breakpoint.
    pub hiatus_depths: Vec<f64>,
    /// One [`Segment`] per depositional regime (`hiatus_depths.len() + 1`),
    /// ordered from the deepest regime upward.
    pub segments: Vec<Segment>,
}

#[derive(Debug)]
pub struct AgeDepthModel {
    dets: Determinations,
    k: usize,
    c0: f64,
    dc: f64,
    hiatus_depths: Vec<f64>,
    segments: Vec<Segment>,
    mem_a: f64,
    mem_b: f64,
    min_age: f64,
    max_age: f64,
    student_t: bool,
    /// Derived section ages, refreshed by `is_admissible`.
    theta: Vec<f64>,
    beyond_limits: u32,
    x0: Vec<f64>,
    xp0: Vec<f64>,
}

fn gamma_draw<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> Result<f64, ModelError> {
    let dist = Gamma::new(shape, scale).map_err(|e| ModelError::Prior(e.to_string()))?;
    Ok(dist.sample(rng))
}

impl AgeDepthModel {
    /// Validate the configuration and simulate the two initial walkers from
    /// the prior. Malformed hiatus ordering is fatal here, before any
    /// sampling can start.
    pub fn new<R: Rng + ?Sized>(
        config: AgeDepthConfig,
        dets: Determinations,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let k = config.sections;
        if k == 0 {
            return Err(ModelError::NoSections);
        }
        if fcmp(config.top_depth, config.bottom_depth) != Ordering::Less {
            return Err(ModelError::InvalidSpan {
                top: config.top_depth,
                bottom: config.bottom_depth,
            });
        }
        let c0 = config.top_depth;
        let dc = (config.bottom_depth - c0) / k as f64;

        let hiatuses = config.hiatus_depths.len();
        if config.segments.len() != hiatuses + 1 {
            return Err(ModelError::SegmentCount {
                expected: hiatuses + 1,
                got: config.segments.len(),
                hiatuses,
            });
        }

        // Depths must descend by at least one section width so that no
        // section crosses two hiatuses, and stay strictly inside the span.
        for (i, &depth) in config.hiatus_depths.iter().enumerate() {
            let upper = if i == 0 {
                config.bottom_depth
            } else {
                config.hiatus_depths[i - 1]
            };
            let limit = upper - dc;
            if fcmp(depth, limit) != Ordering::Less {
                return Err(ModelError::HiatusOrder {
                    index: i,
                    depth,
                    limit,
                });
            }
        }
        if let Some(&shallowest) = config.hiatus_depths.last() {
            if fcmp(shallowest, c0) != Ordering::Greater {
                return Err(ModelError::HiatusAboveTop {
                    depth: shallowest,
                    top: c0,
                });
            }
        }

        if dets.is_empty() {
            return Err(ModelError::NoDeterminations);
        }
        for det in &dets {
            let d = det.depth();
            if fcmp(d, c0) == Ordering::Less
                || fcmp(d, config.bottom_depth) == Ordering::Greater
            {
                return Err(ModelError::DepthOutOfRange {
                    label: det.label().to_string(),
                    depth: d,
                    top: c0,
                    bottom: config.bottom_depth,
                });
            }
        }

        let mut model = AgeDepthModel {
            dets,
            k,
            c0,
            dc,
            hiatus_depths: config.hiatus_depths,
            segments: config.segments,
            mem_a: config.mem_a,
            mem_b: config.mem_b,
            min_age: config.min_age,
            max_age: config.max_age,
            student_t: config.student_t,
            theta: vec![0.0; k + 1],
            beyond_limits: 0,
            x0: vec![0.0; k + 2],
            xp0: vec![0.0; k + 2],
        };
        model.simulate_initial_points(config.age_guess, rng)?;
        Ok(model)
    }

    /// Prior simulation of the two starting walkers: Beta for `w`, Gamma
    /// for the bottom rate, then the memory recurrence upward with jump
    /// draws inside hiatus-crossing sections.
    fn simulate_initial_points<R: Rng + ?Sized>(
        &mut self,
        age_guess: (f64, f64),
        rng: &mut R,
    ) -> Result<(), ModelError> {
        let k = self.k;
        let last_seg = self.segments[self.segments.len() - 1];

        self.x0[0] = age_guess.0;
        self.xp0[0] = age_guess.1;

        let beta = Beta::new(self.mem_a, self.mem_b)
            .map_err(|e| ModelError::Prior(e.to_string()))?;
        let w0: f64 = beta.sample(rng);
        let wp0: f64 = beta.sample(rng);
        self.x0[k + 1] = w0;
        self.xp0[k + 1] = wp0;

        self.x0[k] = gamma_draw(rng, last_seg.acc_shape, 1.0 / last_seg.acc_rate)?;
        self.xp0[k] = gamma_draw(rng, last_seg.acc_shape, 1.0 / last_seg.acc_rate)?;

        for (point, w) in [(0usize, w0), (1usize, wp0)] {
            let mut l = 0usize;
            for section in (1..k).rev() {
                let rate = if self.hiatus_in_section(l, section) {
                    let seg = self.segments[l];
                    l += 1;
                    gamma_draw(rng, seg.jump_shape, 1.0 / (seg.jump_rate * self.dc))?
                } else {
                    let seg = self.segments[l];
                    let next = if point == 0 {
                        self.x0[section + 1]
                    } else {
                        self.xp0[section + 1]
                    };
                    w * next + (1.0 - w) * gamma_draw(rng, seg.acc_shape, 1.0 / seg.acc_rate)?
                };
                if point == 0 {
                    self.x0[section] = rate;
                } else {
                    self.xp0[section] = rate;
                }
            }
        }
        Ok(())
    }

    /// Depth of section boundary `i`.
    pub fn section_depth(&self, i: usize) -> f64 {
        self.c0 + i as f64 * self.dc
    }

    pub fn sections(&self) -> usize {
        self.k
    }

    pub fn section_width(&self) -> f64 {
        self.dc
    }

    /// The two prior-simulated starting walkers.
    pub fn initial_points(&self) -> (&[f64], &[f64]) {
        (&self.x0, &self.xp0)
    }

    pub fn determinations(&self) -> &Determinations {
        &self.dets
    }

    pub fn determinations_mut(&mut self) -> &mut Determinations {
        &mut self.dets
    }

    /// Derived section ages of the most recently admitted vector.
    pub fn section_ages(&self) -> &[f64] {
        &self.theta
    }

    /// Count of derived ages seen outside the configured plausible bounds.
    pub fn beyond_limit_warnings(&self) -> u32 {
        self.beyond_limits
    }

    /// Interpolated calendar age at `depth`, read from the derived ages of
    /// the vector most recently passed to [`Objective::is_admissible`].
    pub fn age_at(&self, depth: f64) -> f64 {
        let t = ((depth - self.c0) / self.dc).floor();
        let i = if t <= 0.0 {
            0
        } else {
            (t as usize).min(self.k - 1)
        };
        self.theta[i] + (depth - self.section_depth(i)) * (self.theta[i + 1] - self.theta[i]) / self.dc
    }

    /// Whether section `section` contains hiatus `l`.
    fn hiatus_in_section(&self, l: usize, section: usize) -> bool {
        match self.hiatus_depths.get(l) {
            Some(&h) => {
                fcmp(self.section_depth(section - 1), h) == Ordering::Less
                    && fcmp(h, self.section_depth(section)) != Ordering::Greater
            }
            None => false,
        }
    }

    /// Recompute the cumulative section ages for `x`, counting (and on the
    /// low side rejecting) ages beyond the configured bounds.
    fn refresh_ages(&mut self, x: &[f64]) -> bool {
        self.theta[0] = x[0];
        let mut ok = true;
        if fcmp(self.theta[0], self.min_age) == Ordering::Less {
            self.beyond_limits += 1;
            ok = false;
        }
        let mut age = x[0];
        for section in 1..=self.k {
            age += x[section] * self.dc;
            self.theta[section] = age;
        }
        if fcmp(self.theta[self.k], self.max_age) == Ordering::Greater {
            self.beyond_limits += 1;
        }
        ok
    }

    /// Negative log prior of the Beta-shaped memory weight, scaled to a
    /// one-unit section width.
    fn mem_prior(&self, w: f64) -> f64 {
        let ds = 1.0;
        let logw = w.ln();
        (ds / self.dc) * (1.0 - self.mem_a) * logw
            + (1.0 - self.mem_b) * (1.0 - ((ds / self.dc) * logw).exp()).ln()
    }

    /// Negative log Gamma prior on a residual accumulation rate in regime
    /// `seg`, up to an additive constant.
    fn acc_prior(&self, seg: usize, rate: f64) -> f64 {
        let s = self.segments[seg];
        (1.0 - s.acc_shape) * rate.ln() + s.acc_rate * rate
    }

    /// Negative log prior on the rate inside a hiatus-crossing section.
    fn jump_prior(&self, seg: usize, rate: f64) -> f64 {
        let s = self.segments[seg];
        (1.0 - s.jump_shape) * rate.ln() + s.jump_rate * self.dc * rate
    }
}

impl Objective for AgeDepthModel {
    fn dim(&self) -> usize {
        self.k + 2
    }

    fn is_admissible(&mut self, x: &[f64]) -> bool {
        let k = self.k;
        let w = x[k + 1];
        // Open interval (0, 1) for the memory weight.
        if fcmp(w, 0.0) != Ordering::Greater || fcmp(w, 1.0) != Ordering::Less {
            return false;
        }
        if fcmp(x[k], 0.0) != Ordering::Greater {
            return false;
        }

        if self.hiatus_depths.is_empty() {
            for section in 1..k {
                let e = (x[section] - w * x[section + 1]) / (1.0 - w);
                if fcmp(e, 0.0) != Ordering::Greater {
                    return false;
                }
            }
        } else {
            let mut l = 0usize;
            for section in (1..k).rev() {
                if self.hiatus_in_section(l, section) {
                    // The bare rate, without the memory recurrence.
                    if fcmp(x[section], 0.0) != Ordering::Greater {
                        return false;
                    }
                    l += 1;
                } else {
                    let e = (x[section] - w * x[section + 1]) / (1.0 - w);
                    if fcmp(e, 0.0) != Ordering::Greater {
                        return false;
                    }
                }
            }
        }

        self.refresh_ages(x)
    }

    fn energy(&mut self, x: &[f64], _prime: bool) -> f64 {
        let k = self.k;
        let w = x[k + 1];

        let mut likelihood = 0.0;
        for det in self.dets.iter() {
            let age = self.age_at(det.depth());
            likelihood += if self.student_t {
                det.energy_t(age)
            } else {
                det.energy_normal(age)
            };
        }

        let mut prior = self.mem_prior(w);
        prior += self.acc_prior(0, x[k]);
        if self.hiatus_depths.is_empty() {
            for section in 1..k {
                prior += self.acc_prior(0, (x[section] - w * x[section + 1]) / (1.0 - w));
            }
        } else {
            let mut l = 0usize;
            for section in (1..k).rev() {
                if self.hiatus_in_section(l, section) {
                    prior += self.jump_prior(l, x[section]);
                    l += 1;
                } else {
                    prior += self.acc_prior(l, (x[section] - w * x[section + 1]) / (1.0 - w));
                }
            }
        }

        prior + likelihood
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Curve;
    use crate::determination::Determination;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn segment() -> Segment {
        Segment {
            acc_shape: 1.5,
            acc_rate: 0.075,
            jump_shape: 1.1,
            jump_rate: 0.01,
        }
    }

    fn dets() -> Determinations {
        let curve = Arc::new(Curve::Constant);
        Determinations::new(vec![
            Determination::new("d-1", 4000.0, 30.0, 5.0, 0.0, 0.0, 3.0, 4.0, curve.clone()),
            Determination::new("d-2", 4500.0, 40.0, 80.0, 0.0, 0.0, 3.0, 4.0, curve),
        ])
    }

    fn config(hiatuses: Vec<f64>, segments: usize) -> AgeDepthConfig {
        AgeDepthConfig {
            sections: 20,
            top_depth: 0.0,
            bottom_depth: 100.0,
            mem_a: 4.0,
            mem_b: 0.7,
            min_age: -100.0,
            max_age: 50_000.0,
            student_t: true,
            age_guess: (4000.0, 4010.0),
            hiatus_depths: hiatuses,
            segments: vec![segment(); segments],
        }
    }

    fn model(hiatuses: Vec<f64>, segments: usize) -> AgeDepthModel {
        let mut rng = SmallRng::seed_from_u64(11);
        AgeDepthModel::new(config(hiatuses, segments), dets(), &mut rng).unwrap()
    }

    #[test]
    fn ascending_hiatuses_fail_construction() {
        let mut rng = SmallRng::seed_from_u64(1);
        let err = AgeDepthModel::new(config(vec![30.0, 60.0], 3), dets(), &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::HiatusOrder { index: 1, .. }));
    }

    #[test]
    fn hiatus_too_close_to_previous_breakpoint_fails() {
        let mut rng = SmallRng::seed_from_u64(1);
        // Sections are 5 deep; 96 is less than one section below the bottom.
        let err = AgeDepthModel::new(config(vec![96.0], 2), dets(), &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::HiatusOrder { index: 0, .. }));
    }

    #[test]
    fn hiatus_at_or_below_the_top_fails() {
        let mut rng = SmallRng::seed_from_u64(1);
        let err = AgeDepthModel::new(config(vec![60.0, 0.0], 3), dets(), &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::HiatusAboveTop { .. }));
    }

    #[test]
    fn sample_depth_outside_span_fails() {
        let curve = Arc::new(Curve::Constant);
        let bad = Determinations::new(vec![Determination::new(
            "deep", 4000.0, 30.0, 150.0, 0.0, 0.0, 3.0, 4.0, curve,
        )]);
        let mut rng = SmallRng::seed_from_u64(1);
        let err = AgeDepthModel::new(config(vec![], 1), bad, &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::DepthOutOfRange { .. }));
    }

    #[test]
    fn prior_simulated_points_are_admissible() {
        for hiatuses in [vec![], vec![50.0]] {
            let segments = hiatuses.len() + 1;
            let mut m = model(hiatuses, segments);
            let (x0, xp0) = (m.x0.clone(), m.xp0.clone());
            assert!(m.is_admissible(&x0));
            assert!(m.is_admissible(&xp0));
        }
    }

    #[test]
    fn memory_weight_boundaries_are_inadmissible() {
        let mut m = model(vec![], 1);
        let mut x = m.x0.clone();
        let k = m.sections();
        x[k + 1] = 0.0;
        assert!(!m.is_admissible(&x));
        x[k + 1] = 1.0;
        assert!(!m.is_admissible(&x));
        x[k + 1] = 0.5;
        assert!(m.is_admissible(&x));
    }

    #[test]
    fn nonpositive_bottom_rate_is_inadmissible() {
        let mut m = model(vec![], 1);
        let mut x = m.x0.clone();
        let k = m.sections();
        x[k] = 0.0;
        assert!(!m.is_admissible(&x));
        x[k] = -0.3;
        assert!(!m.is_admissible(&x));
    }

    #[test]
    fn admissibility_is_idempotent() {
        let mut m = model(vec![50.0], 2);
        let x = m.x0.clone();
        let first = m.is_admissible(&x);
        let ages: Vec<f64> = m.section_ages().to_vec();
        let second = m.is_admissible(&x);
        assert_eq!(first, second);
        assert_eq!(m.section_ages(), ages.as_slice());
    }

    #[test]
    fn derived_ages_are_cumulative_sums() {
        let mut m = model(vec![], 1);
        let k = m.sections();
        let mut x = vec![1.0; k + 2];
        x[0] = 100.0;
        x[k + 1] = 0.5;
        assert!(m.is_admissible(&x));
        let dc = m.section_width();
        for i in 0..=k {
            assert_abs_diff_eq!(m.section_ages()[i], 100.0 + i as f64 * dc, epsilon = 1e-9);
        }
        // Halfway through section 0 the interpolated age is halfway too.
        assert_abs_diff_eq!(m.age_at(dc / 2.0), 100.0 + dc / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn top_age_below_lower_bound_is_inadmissible_and_counted() {
        let mut m = model(vec![], 1);
        let mut x = m.x0.clone();
        x[0] = -10_000.0;
        assert_eq!(m.beyond_limit_warnings(), 0);
        assert!(!m.is_admissible(&x));
        assert_eq!(m.beyond_limit_warnings(), 1);
    }

    #[test]
    fn energy_is_finite_on_admissible_points() {
        for hiatuses in [vec![], vec![50.0]] {
            let segments = hiatuses.len() + 1;
            let mut m = model(hiatuses, segments);
            let x = m.x0.clone();
            assert!(m.is_admissible(&x));
            let u = m.energy(&x, false);
            assert!(u.is_finite(), "energy {u} not finite");
        }
    }

    #[test]
    fn energy_prefers_ages_matching_the_samples() {
        let mut m = model(vec![], 1);
        let k = m.sections();
        // Constant-curve samples: 4000 at depth 5, 4500 at depth 80.
        // A chronology through both should beat one far away from both.
        let mut close = vec![6.25; k + 2];
        close[0] = 3975.0;
        close[k + 1] = 0.5;
        let mut far = close.clone();
        far[0] = 6000.0;
        assert!(m.is_admissible(&close));
        let u_close = m.energy(&close, false);
        assert!(m.is_admissible(&far));
        let u_far = m.energy(&far, false);
        assert!(u_close < u_far);
    }
}
