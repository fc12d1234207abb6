use std::fmt::Display;

use fragseek::FragSeekError;

#[derive(Debug)]
pub enum CliError {
    Io {
        source: String,
        path: Option<String>,
    },
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Pipeline(FragSeekError),
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "io error at {}: {}", path, source),
                None => write!(f, "io error: {}", source),
            },
            Self::Config { source } => write!(f, "configuration error: {}", source),
            Self::ParseError { msg } => write!(f, "parse error: {}", msg),
            Self::Pipeline(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<FragSeekError> for CliError {
    fn from(e: FragSeekError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError { msg: e.to_string() }
    }
}
