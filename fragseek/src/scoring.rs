//! Pluggable log-odds scorers for fragments and neutral losses.
//!
//! Scorers are tagged variants with parameter records; the set active for a
//! computation is assembled from the profile once per identification. The
//! tree-size scorer is a plain value threaded through [`ScorerSet::from_profile`],
//! so raising it never mutates shared state.

use std::sync::OnceLock;

use fragcore::{
    IonMode,
    MolecularFormula,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::preprocess::{
    ProcessedPeak,
    ScoredFormula,
};
use crate::profile::Profile;

/// Log-odds of a mass error `delta` under a centered Gaussian with width
/// `sigma`, against a miss at three sigma: `(9 - (delta/sigma)^2) / 2`.
/// Zero at the window edge, 4.5 at a perfect match.
pub fn gaussian_log_odds(delta: f64, sigma: f64) -> f64 {
    let z = delta / sigma.max(f64::MIN_POSITIVE);
    (9.0 - z * z) / 2.0
}

/// Prior log-odds of observing a precursor under a given ion mode.
/// Protonation and deprotonation carry no cost; exotic charge carriers and
/// intrinsically charged species are rare enough to need strong evidence.
pub fn ion_mode_prior(mode: IonMode) -> f64 {
    match mode {
        IonMode::Protonation | IonMode::Deprotonation => 0.0,
        IonMode::Sodiation | IonMode::Chlorination => -1.0,
        IonMode::Potassiation => -1.5,
        IonMode::Bromination => -2.0,
        IonMode::IntrinsicPositive | IonMode::IntrinsicNegative => -3.0,
    }
}

/// Losses observed so often across fragmentation spectra that an edge
/// explaining one deserves a bonus. Bonuses are log-odds against an
/// arbitrary loss of the same size.
fn common_losses() -> &'static Vec<(MolecularFormula, f64)> {
    static TABLE: OnceLock<Vec<(MolecularFormula, f64)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            ("H2O", 1.5),
            ("NH3", 1.2),
            ("CO", 1.2),
            ("CO2", 1.2),
            ("CH2O", 1.0),
            ("C2H4", 1.0),
            ("CH2O2", 1.0),
            ("HCN", 0.9),
            ("CH4O", 0.9),
            ("C2H4O2", 0.9),
            ("C2H2", 0.8),
            ("CH4", 0.8),
            ("H2S", 0.8),
            ("HCl", 0.8),
            ("H3PO4", 0.8),
            ("HPO3", 0.8),
            ("C3H6", 0.7),
            ("C6H10O5", 0.7),
            ("H2", 0.6),
            ("SO3", 0.6),
            ("C4H8", 0.5),
            ("CH3", 0.3),
        ]
        .into_iter()
        .map(|(formula, bonus)| {
            (
                MolecularFormula::parse(formula).expect("built-in loss formula"),
                bonus,
            )
        })
        .collect()
    })
}

/// Radical losses that occur without the usual hydrogen-rearrangement
/// penalty.
fn tolerated_radicals() -> &'static Vec<MolecularFormula> {
    static TABLE: OnceLock<Vec<MolecularFormula>> = OnceLock::new();
    TABLE.get_or_init(|| {
        ["CH3", "NO2", "NO", "H"]
            .into_iter()
            .map(|formula| MolecularFormula::parse(formula).expect("built-in radical formula"))
            .collect()
    })
}

/// Parameters of the loss-size scorer: a log-normal over the loss mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossSizeParams {
    pub log_mean: f64,
    pub log_sigma: f64,
    pub offset: f64,
}

impl Default for LossSizeParams {
    fn default() -> Self {
        Self {
            log_mean: 4.0,
            log_sigma: 0.7,
            offset: 5.0,
        }
    }
}

/// Scorers over the neutral loss of an edge.
#[derive(Debug, Clone)]
pub enum LossScorer {
    /// Flat bonus for losses from the common-loss table.
    CommonLosses,
    /// Log-normal prior on the loss mass; very large losses are unlikely.
    LossSize(LossSizeParams),
    /// Penalty for radical (half-integer RDBE) losses outside the tolerated
    /// set.
    HydrogenRearrangement { penalty: f64 },
    /// Penalty for losses whose RDBE is negative.
    Rdbe { penalty_per_unit: f64 },
}

impl LossScorer {
    pub fn score(&self, loss: &MolecularFormula) -> f64 {
        match self {
            Self::CommonLosses => common_losses()
                .iter()
                .find(|(formula, _)| formula == loss)
                .map(|(_, bonus)| *bonus)
                .unwrap_or(0.0),
            Self::LossSize(params) => {
                let mass = loss.mass().max(1.0);
                let log_mass = mass.ln();
                let z = (log_mass - params.log_mean) / params.log_sigma;
                let log_pdf = -(mass * params.log_sigma * (2.0 * std::f64::consts::PI).sqrt())
                    .ln()
                    - 0.5 * z * z;
                log_pdf + params.offset
            }
            Self::HydrogenRearrangement { penalty } => {
                let rdbe = loss.rdbe();
                if rdbe.fract().abs() > 1e-9 && !tolerated_radicals().contains(loss) {
                    *penalty
                } else {
                    0.0
                }
            }
            Self::Rdbe { penalty_per_unit } => {
                let rdbe = loss.rdbe();
                if rdbe < 0.0 {
                    penalty_per_unit * -rdbe
                } else {
                    0.0
                }
            }
        }
    }
}

/// Scorers over a (peak, candidate formula) pair.
#[derive(Debug, Clone)]
pub enum FragmentScorer {
    /// Gaussian log-odds of the mass error, precomputed during
    /// decomposition.
    MassDeviation,
    /// Reward intense peaks: `scale * ln(relative / noise_floor)`.
    Intensity { scale: f64, noise_floor: f64 },
    /// Penalty for chemically implausible fragment formulas.
    Plausibility { rdbe_penalty_per_unit: f64 },
    /// Constant bonus per tree vertex, the adaptive knob of the
    /// identification loop.
    TreeSize(f64),
}

impl FragmentScorer {
    pub fn score(&self, peak: &ProcessedPeak, candidate: &ScoredFormula) -> f64 {
        match self {
            Self::MassDeviation => candidate.score,
            Self::Intensity { scale, noise_floor } => {
                if peak.relative_intensity <= 0.0 {
                    return 0.0;
                }
                scale * (peak.relative_intensity / noise_floor).ln().max(0.0)
            }
            Self::Plausibility {
                rdbe_penalty_per_unit,
            } => {
                let rdbe = candidate.formula.rdbe();
                if rdbe < -0.5 {
                    rdbe_penalty_per_unit * (-0.5 - rdbe)
                } else {
                    0.0
                }
            }
            Self::TreeSize(bonus) => *bonus,
        }
    }
}

/// The scorers active for one tree computation.
#[derive(Debug, Clone)]
pub struct ScorerSet {
    pub loss_scorers: Vec<LossScorer>,
    pub fragment_scorers: Vec<FragmentScorer>,
}

impl ScorerSet {
    /// Assemble the default scorer stack, threading the tree-size value for
    /// this computation.
    pub fn from_profile(profile: &Profile, tree_size_score: f64) -> Self {
        Self {
            loss_scorers: vec![
                LossScorer::CommonLosses,
                LossScorer::LossSize(LossSizeParams::default()),
                LossScorer::HydrogenRearrangement { penalty: -2.0 },
                LossScorer::Rdbe {
                    penalty_per_unit: -2.0,
                },
            ],
            fragment_scorers: vec![
                FragmentScorer::MassDeviation,
                FragmentScorer::Intensity {
                    scale: 0.3,
                    noise_floor: profile.min_peak_intensity.max(1e-6),
                },
                FragmentScorer::Plausibility {
                    rdbe_penalty_per_unit: -2.0,
                },
                FragmentScorer::TreeSize(tree_size_score),
            ],
        }
    }

    pub fn score_loss(&self, loss: &MolecularFormula) -> f64 {
        self.loss_scorers.iter().map(|s| s.score(loss)).sum()
    }

    pub fn score_fragment(&self, peak: &ProcessedPeak, candidate: &ScoredFormula) -> f64 {
        self.fragment_scorers
            .iter()
            .map(|s| s.score(peak, candidate))
            .sum()
    }

    /// Score of the root vertex: the parent peak's mass deviation only.
    pub fn score_root(&self, candidate: &ScoredFormula) -> f64 {
        candidate.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_log_odds_shape() {
        assert!((gaussian_log_odds(0.0, 1e-3) - 4.5).abs() < 1e-12);
        assert!(gaussian_log_odds(3e-3, 1e-3).abs() < 1e-9);
        assert!(gaussian_log_odds(5e-3, 1e-3) < 0.0);
    }

    #[test]
    fn water_loss_beats_an_arbitrary_loss() {
        let set = ScorerSet::from_profile(&Profile::qtof(), 0.0);
        let water = MolecularFormula::parse("H2O").unwrap();
        let odd = MolecularFormula::parse("C3H7N2").unwrap();
        assert!(set.score_loss(&water) > set.score_loss(&odd));
    }

    #[test]
    fn huge_losses_are_penalized_by_size() {
        let scorer = LossScorer::LossSize(LossSizeParams::default());
        let water = MolecularFormula::parse("H2O").unwrap();
        let huge = MolecularFormula::parse("C20H30O10").unwrap();
        assert!(scorer.score(&water) > scorer.score(&huge) + 2.0);
    }

    #[test]
    fn radical_losses_are_penalized_unless_tolerated() {
        let scorer = LossScorer::HydrogenRearrangement { penalty: -2.0 };
        let methyl = MolecularFormula::parse("CH3").unwrap();
        let strange = MolecularFormula::parse("C2H5O2").unwrap();
        assert_eq!(scorer.score(&methyl), 0.0);
        assert_eq!(scorer.score(&strange), -2.0);
    }

    #[test]
    fn tree_size_is_a_constant_per_vertex() {
        let peak = ProcessedPeak {
            mz: 100.0,
            intensity: 1.0,
            relative_intensity: 0.5,
            origins: Vec::new(),
            is_parent: false,
            decompositions: Default::default(),
        };
        let candidate = ScoredFormula {
            formula: MolecularFormula::parse("C4H4O2").unwrap(),
            score: 3.0,
        };
        let low = ScorerSet::from_profile(&Profile::qtof(), 0.0);
        let high = ScorerSet::from_profile(&Profile::qtof(), 2.0);
        let delta = high.score_fragment(&peak, &candidate) - low.score_fragment(&peak, &candidate);
        assert!((delta - 2.0).abs() < 1e-12);
    }
}
