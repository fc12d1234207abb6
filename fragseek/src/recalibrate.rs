//! Hypothesis-driven mass recalibration.
//!
//! The fragments of a tree pin observed peaks to theoretical masses; those
//! pairs feed a robust median-slope (Theil-Sen) line per MS2 spectrum plus
//! one merged line. Applying the recalibration rewrites the experiment's
//! m/z axis, after which preprocessing and tree computation run again.

use fragcore::{
    Peak,
    Spectrum,
};
use tracing::debug;

use crate::experiment::Ms2Experiment;
use crate::preprocess::ProcessedInput;
use crate::profile::RecalibrationSettings;
use crate::tree::FTree;

/// A fitted linear mass correction `mz -> intercept + slope * mz`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecalibrationFunction {
    pub slope: f64,
    pub intercept: f64,
}

impl RecalibrationFunction {
    pub fn identity() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }

    pub fn apply(&self, mz: f64) -> f64 {
        self.intercept + self.slope * mz
    }
}

/// Per-spectrum correction functions with a merged fallback.
#[derive(Debug, Clone)]
pub struct SpectralRecalibration {
    per_spectrum: Vec<Option<RecalibrationFunction>>,
    merged: Option<RecalibrationFunction>,
}

impl SpectralRecalibration {
    pub fn function_for(&self, spectrum: usize) -> RecalibrationFunction {
        self.per_spectrum
            .get(spectrum)
            .copied()
            .flatten()
            .or(self.merged)
            .unwrap_or_else(RecalibrationFunction::identity)
    }

    pub fn merged_function(&self) -> Option<RecalibrationFunction> {
        self.merged
    }

    /// The experiment with every MS2 m/z pushed through its correction
    /// function. MS1 stays untouched.
    pub fn apply_to_experiment(&self, experiment: &Ms2Experiment) -> Ms2Experiment {
        let mut corrected = experiment.clone();
        corrected.ms2 = experiment
            .ms2
            .iter()
            .enumerate()
            .map(|(index, spectrum)| {
                let function = self.function_for(index);
                spectrum
                    .iter()
                    .map(|p| Peak {
                        mz: function.apply(p.mz),
                        intensity: p.intensity,
                    })
                    .collect::<Spectrum>()
            })
            .collect();
        corrected
    }
}

/// Collect (observed, theoretical) m/z pairs from the tree's peaks and fit
/// the correction functions. `None` when not even the merged fit has enough
/// support.
pub fn fit_recalibration(
    tree: &FTree,
    input: &ProcessedInput,
    settings: &RecalibrationSettings,
) -> Option<SpectralRecalibration> {
    let mode_shift = input.ion_type.ion_mode().mass_shift();
    let spectra = input.experiment.ms2.len();
    let mut per_spectrum_points: Vec<Vec<(f64, f64)>> = vec![Vec::new(); spectra];
    let mut merged_points: Vec<(f64, f64)> = Vec::new();

    for fragment in &tree.fragments {
        let peak = &input.peaks[fragment.color];
        if peak.relative_intensity < settings.min_intensity && !peak.is_parent {
            continue;
        }
        let theoretical = fragment.formula.mass() + mode_shift;
        // gross outliers would poison even a robust fit
        if (peak.mz - theoretical).abs()
            > input.profile.standard_ms2_deviation.tolerance(theoretical) * 2.0
        {
            continue;
        }
        for origin in &peak.origins {
            per_spectrum_points[origin.spectrum].push((origin.mz, theoretical));
        }
        merged_points.push((peak.mz, theoretical));
    }

    let per_spectrum: Vec<Option<RecalibrationFunction>> = per_spectrum_points
        .iter()
        .map(|points| {
            if points.len() >= settings.min_peaks {
                median_slope(points)
            } else {
                None
            }
        })
        .collect();
    let merged = if merged_points.len() >= 3 {
        median_slope(&merged_points)
    } else {
        None
    };
    if merged.is_none() && per_spectrum.iter().all(Option::is_none) {
        return None;
    }
    debug!(
        merged = merged.is_some(),
        fitted = per_spectrum.iter().filter(|f| f.is_some()).count(),
        "fitted recalibration"
    );
    Some(SpectralRecalibration {
        per_spectrum,
        merged,
    })
}

/// Theil-Sen estimator: median of all pairwise slopes, intercept as the
/// median residual. Rejects degenerate fits far from the identity.
fn median_slope(points: &[(f64, f64)]) -> Option<RecalibrationFunction> {
    if points.len() < 2 {
        return None;
    }
    let mut slopes = Vec::new();
    for (i, &(x1, y1)) in points.iter().enumerate() {
        for &(x2, y2) in &points[i + 1..] {
            if (x2 - x1).abs() > 1e-6 {
                slopes.push((y2 - y1) / (x2 - x1));
            }
        }
    }
    if slopes.is_empty() {
        return None;
    }
    let slope = median(&mut slopes);
    let mut residuals: Vec<f64> = points.iter().map(|&(x, y)| y - slope * x).collect();
    let intercept = median(&mut residuals);
    // a mass axis is never off by more than a whisker
    if (slope - 1.0).abs() > 0.01 || intercept.abs() > 0.5 {
        return None;
    }
    Some(RecalibrationFunction { slope, intercept })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
