use fragcore::{
    FormulaConstraints,
    MassDeviation,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    FragSeekError,
    Result,
};

/// What to do with the MS1 isotope pattern during identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsotopeHandling {
    /// Ignore MS1 entirely.
    Omit,
    /// Restrict candidate formulas to the isotope-filtered set.
    Filter,
    /// Filter (when the pattern is convincing) and add the isotope score to
    /// each candidate's tree.
    #[default]
    Score,
}

/// Settings for the hypothesis-driven mass recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecalibrationSettings {
    /// Maximum deviation a reference pair may have to count as an inlier.
    pub deviation: MassDeviation,
    /// Minimum number of (observed, reference) pairs per spectrum before a
    /// per-spectrum function is fitted.
    pub min_peaks: usize,
    /// Minimum relative intensity of a peak to serve as a reference.
    pub min_intensity: f64,
}

impl Default for RecalibrationSettings {
    fn default() -> Self {
        Self {
            deviation: MassDeviation::new(2.0, 5e-4),
            min_peaks: 8,
            min_intensity: 0.01,
        }
    }
}

/// Immutable per-run measurement configuration.
///
/// Cloned before any per-call adjustment; nothing in the pipeline mutates a
/// profile in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Window for matching candidate formulas against the precursor mass.
    pub allowed_mass_deviation: MassDeviation,
    /// Window for matching MS1 isotope peaks.
    pub standard_ms1_deviation: MassDeviation,
    /// Window for matching MS2 fragment peaks.
    pub standard_ms2_deviation: MassDeviation,
    pub formula_constraints: FormulaConstraints,
    /// Constant per-vertex bonus steering the solver toward larger trees.
    /// The identification loop raises a local copy of this value, never the
    /// profile itself.
    pub tree_size_score: f64,
    pub isotope_handling: IsotopeHandling,
    /// Worker threads for per-candidate tree computation.
    pub parallelism: usize,
    /// Relative intensity below which merged MS2 peaks are dropped (the
    /// parent peak is always kept).
    pub min_peak_intensity: f64,
    pub recalibration: RecalibrationSettings,
}

impl Default for Profile {
    fn default() -> Self {
        Self::qtof()
    }
}

impl Profile {
    /// Default profile for Q-TOF instruments.
    pub fn qtof() -> Self {
        Self {
            allowed_mass_deviation: MassDeviation::new(10.0, 5e-4),
            standard_ms1_deviation: MassDeviation::new(10.0, 5e-4),
            standard_ms2_deviation: MassDeviation::new(10.0, 5e-4),
            formula_constraints: FormulaConstraints::default(),
            tree_size_score: 0.0,
            isotope_handling: IsotopeHandling::Score,
            parallelism: 3,
            min_peak_intensity: 0.002,
            recalibration: RecalibrationSettings::default(),
        }
    }

    /// Default profile for Orbitrap and FT-ICR instruments.
    pub fn orbitrap() -> Self {
        Self {
            allowed_mass_deviation: MassDeviation::new(5.0, 2e-4),
            standard_ms1_deviation: MassDeviation::new(5.0, 2e-4),
            standard_ms2_deviation: MassDeviation::new(5.0, 2e-4),
            ..Self::qtof()
        }
    }

    /// Look a named preset up.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "qtof" | "default" => Ok(Self::qtof()),
            "orbitrap" | "fticr" => Ok(Self::orbitrap()),
            other => Err(FragSeekError::invalid_input(format!(
                "unknown profile '{}', expected qtof or orbitrap",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serde_round_trip() {
        let profile = Profile::orbitrap();
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"parallelism": 8}"#).unwrap();
        assert_eq!(profile.parallelism, 8);
        assert_eq!(profile.tree_size_score, 0.0);
        assert_eq!(profile.isotope_handling, IsotopeHandling::Score);
    }
}
