use fragcore::{
    MolecularFormula,
    PrecursorIonType,
    Spectrum,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    FragSeekError,
    Result,
};
use crate::profile::Profile;

/// One measured compound: an optional MS1 spectrum with the precursor
/// isotope pattern plus one or more MS2 fragmentation spectra.
///
/// `ion_mass` of 0 means "unknown"; the pipeline will derive it from MS1 or
/// refuse to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ms2Experiment {
    pub name: String,
    pub ms1: Option<Spectrum>,
    pub ms2: Vec<Spectrum>,
    /// Measured m/z of the precursor ion.
    pub ion_mass: f64,
    pub precursor_ion_type: PrecursorIonType,
    /// Known neutral formula, when the compound identity is not in question.
    pub neutral_formula: Option<MolecularFormula>,
    /// Per-experiment override of the run profile.
    pub profile: Option<Profile>,
}

impl Ms2Experiment {
    pub fn validate(&self) -> Result<()> {
        if self.precursor_ion_type.charge().abs() != 1 {
            return Err(FragSeekError::invalid_input(format!(
                "{}: only singly charged precursors are supported",
                self.name
            )));
        }
        if self.ms2.iter().all(|s| s.is_empty()) {
            return Err(FragSeekError::invalid_input(format!(
                "{}: no MS2 peaks",
                self.name
            )));
        }
        if self.ion_mass == 0.0 && self.ms1.as_ref().map_or(true, |s| s.is_empty()) {
            return Err(FragSeekError::invalid_input(format!(
                "{}: Please provide the parentmass of the measured compound",
                self.name
            )));
        }
        Ok(())
    }
}

/// Builder for [`Ms2Experiment`].
///
/// The MS1 spectrum is kept whichever way the experiment is assembled; MS2
/// spectra accumulate in the order they are added.
#[derive(Debug, Default)]
pub struct ExperimentBuilder {
    name: Option<String>,
    ms1: Option<Spectrum>,
    ms2: Vec<Spectrum>,
    ion_mass: f64,
    precursor_ion_type: Option<PrecursorIonType>,
    neutral_formula: Option<MolecularFormula>,
    profile: Option<Profile>,
}

impl ExperimentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ms1(mut self, spectrum: Spectrum) -> Self {
        self.ms1 = Some(spectrum);
        self
    }

    pub fn add_ms2(mut self, spectrum: Spectrum) -> Self {
        self.ms2.push(spectrum);
        self
    }

    pub fn ion_mass(mut self, mz: f64) -> Self {
        self.ion_mass = mz;
        self
    }

    pub fn precursor_ion_type(mut self, ion_type: PrecursorIonType) -> Self {
        self.precursor_ion_type = Some(ion_type);
        self
    }

    /// Set the known neutral formula; when the ion mass is still unset it is
    /// derived from the formula and the ion type.
    pub fn neutral_formula(mut self, formula: MolecularFormula) -> Self {
        self.neutral_formula = Some(formula);
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn build(self) -> Result<Ms2Experiment> {
        let precursor_ion_type = self
            .precursor_ion_type
            .ok_or_else(|| FragSeekError::invalid_input("missing precursor ion type"))?;
        let mut ion_mass = self.ion_mass;
        if ion_mass == 0.0 {
            if let Some(formula) = &self.neutral_formula {
                ion_mass = precursor_ion_type.neutral_mass_to_ion_mass(formula.mass());
            }
        }
        Ok(Ms2Experiment {
            name: self.name.unwrap_or_else(|| "unnamed".to_string()),
            ms1: self.ms1,
            ms2: self.ms2,
            ion_mass,
            precursor_ion_type,
            neutral_formula: self.neutral_formula,
            profile: self.profile,
        })
    }
}
