//! Molecular formula identification from tandem mass spectrometry.
//!
//! Given one precursor isotope pattern and one or more fragmentation
//! spectra of a single compound, the pipeline produces a ranked list of
//! candidate neutral formulas, each paired with a fragmentation tree whose
//! nodes explain observed peaks and whose edges are neutral losses.
//!
//! The interesting parts live in [`identify`] (the adaptive
//! candidate-selection loop) and [`solve`] (the maximum colorful subtree
//! search). Everything chemical below the pipeline comes from the
//! `fragcore` crate.

pub mod errors;
pub mod experiment;
pub mod graph;
pub mod identify;
pub mod ms1;
pub mod preprocess;
pub mod profile;
pub mod recalibrate;
pub mod results;
pub mod scoring;
pub mod solve;
pub mod tree;

pub use errors::{
    FragSeekError,
    Result,
};
pub use experiment::{
    ExperimentBuilder,
    Ms2Experiment,
};
pub use fragcore::{
    FormulaConstraints,
    MassDeviation,
    MolecularFormula,
    PrecursorIonType,
    Spectrum,
};
pub use identify::{
    Identifier,
    IdentifyOptions,
    ProgressObserver,
    ISOTOPE_SCORE_NAME,
};
pub use profile::{
    IsotopeHandling,
    Profile,
};
pub use results::IdentificationResult;
pub use tree::FTree;

/// Wrap parallel m/z and intensity arrays into a spectrum.
pub fn wrap_spectrum(mz: &[f64], intensity: &[f64]) -> Result<Spectrum> {
    Ok(Spectrum::from_arrays(mz, intensity)?)
}

/// Parse a molecular formula in plain element-count notation.
pub fn parse_formula(input: &str) -> Result<MolecularFormula> {
    Ok(MolecularFormula::parse(input)?)
}

/// Parse a precursor ion type name such as `[M+H]+`.
pub fn parse_ion_type(name: &str) -> Result<PrecursorIonType> {
    Ok(PrecursorIonType::parse(name)?)
}

/// Parse a formula constraint string such as `CHNOPS[20]`.
pub fn formula_constraints(input: &str) -> Result<FormulaConstraints> {
    Ok(FormulaConstraints::parse(input)?)
}
