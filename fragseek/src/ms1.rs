//! MS1 isotope pattern extraction and scoring.
//!
//! Extraction walks the MS1 spectrum in ~1 Da steps from a candidate
//! monoisotopic peak, folding everything inside the window into one peak
//! per nominal mass. Scoring compares the measured pattern against the
//! simulated pattern of every candidate formula with a Gaussian model on
//! the mass axis and a log-normal model on the intensity ratios.

use std::collections::BTreeMap;

use fragcore::isotopes::simulate_pattern;
use fragcore::{
    MassDecomposer,
    MassDeviation,
    MolecularFormula,
    Peak,
    PrecursorIonType,
    Spectrum,
    ISOTOPE_SPACING,
};
use statrs::distribution::{
    Continuous,
    Normal,
};
use tracing::debug;

use crate::errors::Result;
use crate::experiment::Ms2Experiment;
use crate::preprocess::ScoredFormula;
use crate::profile::Profile;

/// Maximum isotopologue peaks considered per pattern.
pub const MAX_ISOTOPE_PEAKS: usize = 5;

/// Width of the log-intensity-ratio model.
const INTENSITY_SIGMA: f64 = 0.35;

/// Score charged to a theoretical peak with no measured counterpart.
const MISSING_PEAK_PENALTY: f64 = -1.0;

/// One extracted isotope pattern with its scored formula candidates.
#[derive(Debug, Clone)]
pub struct IsotopePattern {
    /// m/z of the monoisotopic peak.
    pub monoisotopic_mz: f64,
    /// Measured pattern, intensities normalized to sum to 1.
    pub pattern: Spectrum,
    /// Neutral formula candidates, best first.
    pub candidates: Vec<ScoredFormula>,
}

impl IsotopePattern {
    pub fn best_score(&self) -> f64 {
        self.candidates
            .first()
            .map(|c| c.score)
            .unwrap_or(f64::NEG_INFINITY)
    }
}

/// Extract raw patterns around `target_mz`, or across the whole spectrum
/// when `target_mz` is zero.
fn extract_raw_patterns(
    ms1: &Spectrum,
    target_mz: f64,
    deviation: MassDeviation,
) -> Vec<(f64, Spectrum)> {
    let mono_candidates: Vec<Peak> = if target_mz > 0.0 {
        ms1.peaks_within(target_mz, deviation).to_vec()
    } else {
        // any peak without a plausible isotope parent one spacing below is
        // its own monoisotopic candidate
        ms1.iter()
            .filter(|p| {
                ms1.best_peak_within(p.mz - ISOTOPE_SPACING, deviation.scaled(2.0))
                    .is_none()
            })
            .copied()
            .collect()
    };

    mono_candidates
        .into_iter()
        .map(|mono| {
            let mut peaks = Vec::new();
            for k in 0..MAX_ISOTOPE_PEAKS {
                let expected = mono.mz + k as f64 * ISOTOPE_SPACING;
                let hits = ms1.peaks_within(expected, deviation.scaled(2.0));
                if hits.is_empty() {
                    break;
                }
                let intensity: f64 = hits.iter().map(|p| p.intensity).sum();
                let mz = hits.iter().map(|p| p.mz * p.intensity).sum::<f64>() / intensity;
                peaks.push(Peak { mz, intensity });
            }
            (mono.mz, Spectrum::new(peaks).normalized_to_sum())
        })
        .filter(|(_, pattern)| !pattern.is_empty())
        .collect()
}

/// Log-likelihood ratio of a measured pattern under a candidate's
/// theoretical pattern, versus a three-sigma miss on every axis.
pub fn score_pattern(
    measured: &Spectrum,
    theoretical: &Spectrum,
    ms1_deviation: MassDeviation,
) -> f64 {
    let theoretical = theoretical.normalized_to_sum();
    let mut score = 0.0;
    for (k, peak) in measured.iter().enumerate() {
        let Some(reference) = theoretical.peaks().get(k) else {
            score += MISSING_PEAK_PENALTY;
            continue;
        };
        let sigma = (ms1_deviation.tolerance(reference.mz) / 3.0).max(f64::MIN_POSITIVE);
        let mass_model = Normal::new(0.0, sigma).expect("positive sigma");
        score += mass_model.ln_pdf(peak.mz - reference.mz) - mass_model.ln_pdf(3.0 * sigma);

        if peak.intensity > 0.0 && reference.intensity > 0.0 {
            let intensity_model =
                Normal::new(0.0, INTENSITY_SIGMA).expect("positive sigma");
            let log_ratio = (peak.intensity / reference.intensity).ln();
            score += intensity_model.ln_pdf(log_ratio)
                - intensity_model.ln_pdf(3.0 * INTENSITY_SIGMA);
        }
    }
    // theoretical peaks the measurement never showed
    let unmatched = theoretical.len().saturating_sub(measured.len());
    score + unmatched as f64 * MISSING_PEAK_PENALTY
}

/// Extract and score isotope patterns from the experiment's MS1 spectrum.
/// Returns an empty list when there is no MS1 data.
pub fn analyze_ms1(
    experiment: &Ms2Experiment,
    profile: &Profile,
    ion_type: &PrecursorIonType,
    target_mz: f64,
) -> Result<Vec<IsotopePattern>> {
    let Some(ms1) = &experiment.ms1 else {
        return Ok(Vec::new());
    };
    if ms1.is_empty() {
        return Ok(Vec::new());
    }
    let decomposer = MassDecomposer::new(profile.formula_constraints.clone());
    let mut patterns = Vec::new();
    for (mono_mz, pattern) in extract_raw_patterns(ms1, target_mz, profile.standard_ms1_deviation)
    {
        let neutral_mass = ion_type.ion_mass_to_neutral_mass(mono_mz);
        let mut candidates: Vec<ScoredFormula> = decomposer
            .decompose(neutral_mass, profile.allowed_mass_deviation)
            .into_iter()
            .map(|formula| {
                let theoretical = simulate_pattern(&formula, ion_type, MAX_ISOTOPE_PEAKS);
                let score = score_pattern(&pattern, &theoretical, profile.standard_ms1_deviation);
                ScoredFormula { formula, score }
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.formula.cmp(&b.formula))
        });
        patterns.push(IsotopePattern {
            monoisotopic_mz: mono_mz,
            pattern,
            candidates,
        });
    }
    patterns.sort_by(|a, b| b.best_score().total_cmp(&a.best_score()));
    debug!(patterns = patterns.len(), "ms1 analysis finished");
    Ok(patterns)
}

/// Keep formulas from the best pattern while
/// `score > 0 && score/best >= 0.666 && score/previous >= 0.5`, stopping at
/// the first violation. Returns the surviving map and the best score.
pub fn filter_candidates(pattern: &IsotopePattern) -> (BTreeMap<MolecularFormula, f64>, f64) {
    let mut kept = BTreeMap::new();
    let Some(best) = pattern.candidates.first() else {
        return (kept, 0.0);
    };
    if best.score <= 0.0 {
        return (kept, 0.0);
    }
    kept.insert(best.formula.clone(), best.score);
    for pair in pattern.candidates.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.score <= 0.0
            || current.score / best.score < 0.666
            || current.score / previous.score < 0.5
        {
            break;
        }
        kept.insert(current.formula.clone(), current.score);
    }
    (kept, best.score)
}
