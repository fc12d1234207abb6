//! Base chemistry for small-molecule mass spectrometry.
//!
//! This crate carries everything below the identification pipeline: the
//! periodic table, molecular formulas and their arithmetic, ppm/abs mass
//! deviations, ionizations and precursor ion types, centroided spectra,
//! theoretical isotope distributions and integer mass decomposition.
//! It knows nothing about fragmentation trees or scoring.

pub mod constants;
pub mod decompose;
pub mod deviation;
pub mod element;
pub mod errors;
pub mod formula;
pub mod ionization;
pub mod isotopes;
pub mod spectrum;

pub use constants::{
    ELECTRON_MASS,
    ISOTOPE_SPACING,
    PROTON_MASS,
};
pub use decompose::{
    FormulaConstraints,
    MassDecomposer,
};
pub use deviation::MassDeviation;
pub use element::{
    Element,
    ElementId,
    Isotope,
    PeriodicTable,
};
pub use errors::ChemError;
pub use formula::MolecularFormula;
pub use ionization::{
    IonMode,
    PrecursorIonType,
};
pub use isotopes::isotope_distribution;
pub use spectrum::{
    Peak,
    Spectrum,
};
