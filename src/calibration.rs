//! Calibration curves at their interface boundary.
//!
//! A curve maps a calendar age to the expected measured value and its
//! uncertainty, and turns a dated measurement into a negative-log-energy
//! contribution, either with the traditional normal model or with the
//! heavier-tailed Student-t model. Curve tables are built from in-memory
//! rows; file formats and loading live outside this crate.

use thiserror::Error;

use crate::math::fcmp;

#[derive(Debug, Error)]
pub enum CurveError {
    #[error("curve {name:?} needs at least two rows, got {rows}")]
    TooFewRows { name: String, rows: usize },
    #[error("curve {name:?} is not strictly ascending in calendar age at row {row}")]
    NotAscending { name: String, row: usize },
}

/// The closed set of calibration behaviors, dispatched by match.
#[derive(Debug, Clone)]
pub enum Curve {
    /// Identity curve: the measured value is the calendar age itself.
    Constant,
    /// Piecewise-linear interpolation of a tabulated curve.
    Table(CurveTable),
}

/// A three-column calibration table `(cal age, measured age, sd)`, strictly
/// ascending in calendar age.
#[derive(Debug, Clone)]
pub struct CurveTable {
    name: String,
    cal: Vec<f64>,
    mu: Vec<f64>,
    sd: Vec<f64>,
}

impl CurveTable {
    pub fn new(
        name: impl Into<String>,
        rows: impl IntoIterator<Item = [f64; 3]>,
    ) -> Result<Self, CurveError> {
        let name = name.into();
        let mut cal = Vec::new();
        let mut mu = Vec::new();
        let mut sd = Vec::new();
        for [c, m, s] in rows {
            cal.push(c);
            mu.push(m);
            sd.push(s);
        }
        if cal.len() < 2 {
            return Err(CurveError::TooFewRows {
                name,
                rows: cal.len(),
            });
        }
        for i in 1..cal.len() {
            if fcmp(cal[i - 1], cal[i]) != std::cmp::Ordering::Less {
                return Err(CurveError::NotAscending { name, row: i });
            }
        }
        Ok(CurveTable { name, cal, mu, sd })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_cal(&self) -> f64 {
        self.cal[0]
    }

    pub fn max_cal(&self) -> f64 {
        self.cal[self.cal.len() - 1]
    }

    /// Interpolated `(mu, sd)` at calendar age `theta`; beyond either end
    /// the boundary segment's slope is extended.
    pub fn lookup(&self, theta: f64) -> (f64, f64) {
        let last = self.cal.len() - 1;
        let k = if fcmp(theta, self.cal[0]) == std::cmp::Ordering::Less {
            0
        } else if fcmp(theta, self.cal[last]) == std::cmp::Ordering::Less {
            // cal[k] <= theta < cal[k + 1]
            self.cal.partition_point(|&c| c <= theta).saturating_sub(1)
        } else {
            last - 1
        };
        let span = self.cal[k + 1] - self.cal[k];
        let t = (theta - self.cal[k]) / span;
        let mu = self.mu[k] + t * (self.mu[k + 1] - self.mu[k]);
        let sd = self.sd[k] + t * (self.sd[k + 1] - self.sd[k]);
        (mu, sd)
    }
}

// 0.5 * ln(2 * pi)
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;

impl Curve {
    pub fn name(&self) -> &str {
        match self {
            Curve::Constant => "constant",
            Curve::Table(t) => t.name(),
        }
    }

    /// Normal-model energy of measuring `y` (variance `vr`) at age `theta`.
    pub fn energy_normal(&self, y: f64, vr: f64, theta: f64) -> f64 {
        match self {
            Curve::Constant => 0.5 * (y - theta) * (y - theta) / vr,
            Curve::Table(t) => {
                let (mu, sd) = t.lookup(theta);
                let tau = 1.0 / (vr + sd * sd);
                HALF_LN_2PI - 0.5 * tau.ln() + 0.5 * tau * (y - mu) * (y - mu)
            }
        }
    }

    /// Student-t-model energy with shape parameters `(a, b)`.
    pub fn energy_t(&self, y: f64, vr: f64, theta: f64, a: f64, b: f64) -> f64 {
        match self {
            Curve::Constant => (a + 0.5) * (b + 0.5 * (y - theta) * (y - theta) / vr).ln(),
            Curve::Table(t) => {
                let (mu, sd) = t.lookup(theta);
                let tau = 1.0 / (vr + sd * sd);
                (a + 0.5) * (b + 0.5 * tau * (y - mu) * (y - mu)).ln()
            }
        }
    }
}
