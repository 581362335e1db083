//! Dated samples ("determinations") and their per-age energies.

use std::sync::Arc;

use crate::calibration::Curve;

/// One dated sample: a measured value at a known depth, with an optional
/// reservoir correction and Student-t prior shape parameters.
///
/// The reservoir-corrected mean and variance are precomputed; the fields
/// are otherwise read-only once the collection is built. The two setters
/// exist for the outer multi-core layer, which rewrites a shared marker
/// value into every chronology's samples between coarse synchronization
/// barriers.
#[derive(Debug, Clone)]
pub struct Determination {
    label: String,
    mean: f64,
    sd: f64,
    depth: f64,
    res_mean: f64,
    res_sd: f64,
    t_a: f64,
    t_b: f64,
    curve: Arc<Curve>,
    corrected_mean: f64,
    corrected_vr: f64,
}

impl Determination {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: impl Into<String>,
        mean: f64,
        sd: f64,
        depth: f64,
        res_mean: f64,
        res_sd: f64,
        t_a: f64,
        t_b: f64,
        curve: Arc<Curve>,
    ) -> Self {
        Determination {
            label: label.into(),
            mean,
            sd,
            depth,
            res_mean,
            res_sd,
            t_a,
            t_b,
            curve,
            corrected_mean: mean - res_mean,
            corrected_vr: sd * sd + res_sd * res_sd,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sd(&self) -> f64 {
        self.sd
    }

    pub fn corrected_mean(&self) -> f64 {
        self.corrected_mean
    }

    pub fn corrected_vr(&self) -> f64 {
        self.corrected_vr
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    /// Overwrite the corrected mean (marker synchronization).
    pub fn set_corrected_mean(&mut self, y: f64) {
        self.corrected_mean = y;
    }

    /// Replace the measurement sd, refreshing the corrected variance.
    pub fn set_sd(&mut self, sd: f64) {
        self.sd = sd;
        self.corrected_vr = sd * sd + self.res_sd * self.res_sd;
    }

    /// Normal-model energy of this sample at calendar age `theta`.
    pub fn energy_normal(&self, theta: f64) -> f64 {
        self.curve
            .energy_normal(self.corrected_mean, self.corrected_vr, theta)
    }

    /// Student-t-model energy of this sample at calendar age `theta`.
    pub fn energy_t(&self, theta: f64) -> f64 {
        self.curve
            .energy_t(self.corrected_mean, self.corrected_vr, theta, self.t_a, self.t_b)
    }
}

/// The ordered, fixed-size collection of dated samples a model holds.
#[derive(Debug, Clone, Default)]
pub struct Determinations {
    dets: Vec<Determination>,
}

impl Determinations {
    pub fn new(dets: Vec<Determination>) -> Self {
        Determinations { dets }
    }

    pub fn len(&self) -> usize {
        self.dets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Determination> {
        self.dets.iter()
    }

    pub fn get(&self, i: usize) -> &Determination {
        &self.dets[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Determination {
        &mut self.dets[i]
    }
}

impl<'a> IntoIterator for &'a Determinations {
    type Item = &'a Determination;
    type IntoIter = std::slice::Iter<'a, Determination>;

    fn into_iter(self) -> Self::IntoIter {
        self.dets.iter()
    }
}
