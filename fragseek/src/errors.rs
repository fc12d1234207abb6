use std::fmt::Display;
use std::path::PathBuf;

use fragcore::ChemError;

/// Errors surfaced by the identification pipeline.
///
/// Infeasible decompositions and infeasible subtrees are deliberately *not*
/// here: they come back as empty candidate lists or `None` trees. `Internal`
/// marks invariant violations (a solver returning a tree whose recomputed
/// score disagrees with its stored score); those abort the current
/// identification but are not user errors.
#[derive(Debug)]
pub enum FragSeekError {
    InvalidInput {
        message: String,
    },
    /// More than one positive-scoring MS1 isotope pattern and no
    /// user-supplied precursor mass.
    AmbiguousIsotopePattern {
        message: String,
    },
    Chem(ChemError),
    Internal {
        message: String,
    },
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Parse {
        message: String,
    },
}

impl Display for FragSeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid input: {}", message),
            Self::AmbiguousIsotopePattern { message } => {
                write!(f, "ambiguous isotope pattern: {}", message)
            }
            Self::Chem(e) => write!(f, "{}", e),
            Self::Internal { message } => write!(f, "internal error: {}", message),
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "io error at {:?}: {}", path, source),
                None => write!(f, "io error: {}", source),
            },
            Self::Parse { message } => write!(f, "parse error: {}", message),
        }
    }
}

impl std::error::Error for FragSeekError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Chem(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl FragSeekError {
    pub fn invalid_input(message: impl Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    pub fn internal(message: impl Display) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }
}

impl From<ChemError> for FragSeekError {
    fn from(e: ChemError) -> Self {
        Self::Chem(e)
    }
}

impl From<serde_json::Error> for FragSeekError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FragSeekError>;
