use std::fmt::Display;

/// Errors raised by the chemistry layer.
///
/// Everything here is an input problem: unknown symbols, malformed formula
/// or ion-type strings, inconsistent spectra. Infeasible decompositions are
/// *not* errors; they come back as empty result lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ChemError {
    UnknownElement {
        symbol: String,
    },
    InvalidFormula {
        input: String,
        message: String,
    },
    InvalidIonType {
        name: String,
    },
    InvalidConstraints {
        input: String,
        message: String,
    },
    InvalidSpectrum {
        message: String,
    },
}

impl Display for ChemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownElement { symbol } => {
                write!(f, "unknown element symbol '{}'", symbol)
            }
            Self::InvalidFormula { input, message } => {
                write!(f, "cannot parse molecular formula '{}': {}", input, message)
            }
            Self::InvalidIonType { name } => {
                write!(f, "unknown ion type '{}'", name)
            }
            Self::InvalidConstraints { input, message } => {
                write!(f, "cannot parse formula constraints '{}': {}", input, message)
            }
            Self::InvalidSpectrum { message } => {
                write!(f, "invalid spectrum: {}", message)
            }
        }
    }
}

impl std::error::Error for ChemError {}
