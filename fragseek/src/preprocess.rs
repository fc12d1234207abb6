//! MS2 peak preprocessing: merge, normalize, decompose.
//!
//! The merged peak list and the per-peak decompositions depend only on the
//! experiment, the profile and the ion type, so the result is computed once
//! per identification and reused across every iteration of the adaptive
//! tree-size loop.

use fragcore::{
    MassDecomposer,
    MolecularFormula,
    PrecursorIonType,
};
use itertools::Itertools;
use tracing::debug;

use crate::errors::Result;
use crate::experiment::Ms2Experiment;
use crate::profile::Profile;
use crate::scoring::gaussian_log_odds;

/// Merged peaks beyond this many (ordered by intensity) are dropped to keep
/// graph construction and solving tractable.
const MAX_PEAKS: usize = 40;

/// A candidate sub-formula for one peak, with its mass-deviation score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFormula {
    pub formula: MolecularFormula,
    pub score: f64,
}

/// All sub-formulas consistent with one peak.
#[derive(Debug, Clone, Default)]
pub struct DecompositionList {
    pub candidates: Vec<ScoredFormula>,
}

/// Where a merged peak came from, for recalibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakOrigin {
    pub spectrum: usize,
    pub mz: f64,
    pub intensity: f64,
}

/// One merged, normalized and decomposed MS2 peak.
#[derive(Debug, Clone)]
pub struct ProcessedPeak {
    pub mz: f64,
    pub intensity: f64,
    pub relative_intensity: f64,
    pub origins: Vec<PeakOrigin>,
    pub is_parent: bool,
    /// For the parent peak: neutral compound formulas. For fragment peaks:
    /// fragment backbone formulas (the ion minus its charge carrier).
    pub decompositions: DecompositionList,
}

/// The validated experiment together with its merged peak list and
/// decompositions, immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessedInput {
    pub experiment: Ms2Experiment,
    pub profile: Profile,
    pub ion_type: PrecursorIonType,
    /// Sorted by m/z ascending; exactly one peak has `is_parent` set.
    pub peaks: Vec<ProcessedPeak>,
    pub parent_index: usize,
}

impl ProcessedInput {
    pub fn parent_peak(&self) -> &ProcessedPeak {
        &self.peaks[self.parent_index]
    }

    /// Neutral compound formula candidates at the parent peak.
    pub fn parent_decompositions(&self) -> &DecompositionList {
        &self.parent_peak().decompositions
    }

    /// Total relative intensity of the fragment peaks (the parent peak is
    /// the trivially explained root and does not count).
    pub fn total_fragment_intensity(&self) -> f64 {
        self.peaks
            .iter()
            .filter(|p| !p.is_parent)
            .map(|p| p.relative_intensity)
            .sum()
    }
}

/// Merge, normalize and decompose the MS2 spectra of an experiment under a
/// fixed ion type.
pub fn preprocess(
    experiment: &Ms2Experiment,
    profile: &Profile,
    ion_type: &PrecursorIonType,
) -> Result<ProcessedInput> {
    experiment.validate()?;
    let ms2_deviation = profile.standard_ms2_deviation;

    // flatten all spectra and merge peaks within the deviation window
    let flat: Vec<PeakOrigin> = experiment
        .ms2
        .iter()
        .enumerate()
        .flat_map(|(spectrum, s)| {
            s.iter().map(move |p| PeakOrigin {
                spectrum,
                mz: p.mz,
                intensity: p.intensity,
            })
        })
        .sorted_by(|a, b| a.mz.partial_cmp(&b.mz).expect("finite m/z"))
        .collect();

    let mut merged: Vec<ProcessedPeak> = Vec::new();
    for origin in flat {
        let joined = match merged.last_mut() {
            Some(last) if ms2_deviation.is_within(origin.mz, last.mz) => {
                let total = last.intensity + origin.intensity;
                last.mz = (last.mz * last.intensity + origin.mz * origin.intensity) / total;
                last.intensity = total;
                last.origins.push(origin);
                true
            }
            _ => false,
        };
        if !joined {
            merged.push(ProcessedPeak {
                mz: origin.mz,
                intensity: origin.intensity,
                relative_intensity: 0.0,
                origins: vec![origin],
                is_parent: false,
                decompositions: DecompositionList::default(),
            });
        }
    }

    // locate the parent peak, synthesizing one when the precursor was not
    // scanned
    let parent = merged
        .iter()
        .enumerate()
        .filter(|(_, p)| profile.allowed_mass_deviation.is_within(p.mz, experiment.ion_mass))
        .max_by(|a, b| {
            a.1.intensity
                .partial_cmp(&b.1.intensity)
                .expect("finite intensity")
        })
        .map(|(i, _)| i);
    match parent {
        Some(i) => merged[i].is_parent = true,
        None => {
            debug!(
                ion_mass = experiment.ion_mass,
                "no parent peak measured, synthesizing one"
            );
            merged.push(ProcessedPeak {
                mz: experiment.ion_mass,
                intensity: 0.0,
                relative_intensity: 0.0,
                origins: Vec::new(),
                is_parent: true,
                decompositions: DecompositionList::default(),
            });
        }
    }

    // normalize to the base peak and apply the noise floor
    let base = merged
        .iter()
        .map(|p| p.intensity)
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    for peak in &mut merged {
        peak.relative_intensity = peak.intensity / base;
    }
    let mut peaks: Vec<ProcessedPeak> = merged
        .into_iter()
        .filter(|p| p.is_parent || p.relative_intensity >= profile.min_peak_intensity)
        .collect();
    if peaks.len() > MAX_PEAKS {
        peaks.sort_by(|a, b| {
            b.is_parent
                .cmp(&a.is_parent)
                .then_with(|| {
                    b.relative_intensity
                        .partial_cmp(&a.relative_intensity)
                        .expect("finite intensity")
                })
        });
        peaks.truncate(MAX_PEAKS);
    }
    peaks.sort_by(|a, b| a.mz.partial_cmp(&b.mz).expect("finite m/z"));
    let parent_index = peaks
        .iter()
        .position(|p| p.is_parent)
        .expect("parent peak present after preprocessing");

    // decompose: neutral compound candidates at the parent, fragment
    // backbone candidates everywhere else
    let decomposer = MassDecomposer::new(profile.formula_constraints.clone());
    let mode_shift = ion_type.ion_mode().mass_shift();

    let parent_neutral_mass = ion_type.ion_mass_to_neutral_mass(peaks[parent_index].mz);
    let parent_candidates =
        decompose_scored(&decomposer, parent_neutral_mass, profile, true);
    let parent_measured: Vec<MolecularFormula> = parent_candidates
        .iter()
        .filter_map(|c| ion_type.neutral_to_measured_formula(&c.formula))
        .collect();
    peaks[parent_index].decompositions = DecompositionList {
        candidates: parent_candidates,
    };

    for (i, peak) in peaks.iter_mut().enumerate() {
        if i == parent_index {
            continue;
        }
        let fragment_mass = peak.mz - mode_shift;
        if fragment_mass < 1.5 {
            continue;
        }
        let mut candidates = decompose_scored(&decomposer, fragment_mass, profile, false);
        // fragments must stay reachable from at least one parent candidate
        candidates.retain(|c| {
            parent_measured
                .iter()
                .any(|parent| c.formula.is_subset_of(parent))
        });
        peak.decompositions = DecompositionList { candidates };
    }

    debug!(
        peaks = peaks.len(),
        parent_candidates = peaks[parent_index].decompositions.candidates.len(),
        "preprocessing finished"
    );

    Ok(ProcessedInput {
        experiment: experiment.clone(),
        profile: profile.clone(),
        ion_type: ion_type.clone(),
        peaks,
        parent_index,
    })
}

fn decompose_scored(
    decomposer: &MassDecomposer,
    mass: f64,
    profile: &Profile,
    is_parent: bool,
) -> Vec<ScoredFormula> {
    let deviation = if is_parent {
        profile.allowed_mass_deviation
    } else {
        profile.standard_ms2_deviation
    };
    let sigma = deviation.tolerance(mass) / 3.0;
    decomposer
        .decompose(mass, deviation)
        .into_iter()
        .map(|formula| {
            let score = gaussian_log_odds(formula.mass() - mass, sigma);
            ScoredFormula { formula, score }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use fragcore::Spectrum;

    use super::*;
    use crate::experiment::ExperimentBuilder;

    fn glucose_experiment() -> Ms2Experiment {
        ExperimentBuilder::new()
            .name("glucose")
            .precursor_ion_type(PrecursorIonType::parse("[M+H]+").unwrap())
            .ion_mass(181.0707)
            .add_ms2(Spectrum::from_arrays(&[85.0284, 163.0601, 181.0706], &[0.4, 0.6, 1.0]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn parent_peak_is_located_and_decomposed() {
        let experiment = glucose_experiment();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        let input = preprocess(&experiment, &profile, &ion).unwrap();
        let parent = input.parent_peak();
        assert!(parent.is_parent);
        assert!((parent.mz - 181.0706).abs() < 1e-3);
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        assert!(input
            .parent_decompositions()
            .candidates
            .iter()
            .any(|c| c.formula == glucose));
    }

    #[test]
    fn fragments_are_subsets_of_some_parent_candidate() {
        let experiment = glucose_experiment();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        let input = preprocess(&experiment, &profile, &ion).unwrap();
        let water_loss = MolecularFormula::parse("C6H10O5").unwrap();
        let fragment = input
            .peaks
            .iter()
            .find(|p| !p.is_parent && (p.mz - 163.0601).abs() < 1e-3)
            .unwrap();
        assert!(fragment
            .decompositions
            .candidates
            .iter()
            .any(|c| c.formula == water_loss));
    }

    #[test]
    fn close_peaks_are_merged_across_spectra() {
        let experiment = ExperimentBuilder::new()
            .precursor_ion_type(PrecursorIonType::parse("[M+H]+").unwrap())
            .ion_mass(181.0707)
            .add_ms2(Spectrum::from_arrays(&[163.0601], &[0.5]).unwrap())
            .add_ms2(Spectrum::from_arrays(&[163.0604, 181.0706], &[0.5, 1.0]).unwrap())
            .build()
            .unwrap();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        let input = preprocess(&experiment, &profile, &ion).unwrap();
        let merged: Vec<_> = input
            .peaks
            .iter()
            .filter(|p| (p.mz - 163.06).abs() < 0.01)
            .collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].origins.len(), 2);
        assert!((merged[0].intensity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_parent_peak_is_synthesized() {
        let experiment = ExperimentBuilder::new()
            .precursor_ion_type(PrecursorIonType::parse("[M+H]+").unwrap())
            .ion_mass(181.0707)
            .add_ms2(Spectrum::from_arrays(&[85.0284, 163.0601], &[0.4, 0.6]).unwrap())
            .build()
            .unwrap();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        let input = preprocess(&experiment, &profile, &ion).unwrap();
        let parent = input.parent_peak();
        assert_eq!(parent.mz, 181.0707);
        assert_eq!(parent.relative_intensity, 0.0);
        assert!(!input.parent_decompositions().candidates.is_empty());
    }
}
