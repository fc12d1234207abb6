use std::path::PathBuf;

use fragseek::{
    IsotopeHandling,
    Profile,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named profile preset (`qtof` or `orbitrap`).
    pub profile: String,

    /// Fine-grained overrides applied on top of the preset.
    pub profile_overrides: Option<Profile>,

    /// Number of candidates reported per experiment.
    pub candidates: usize,

    /// Whether the recalibration pass runs.
    pub recalibrate: bool,

    /// Override of the profile's isotope handling.
    pub isotope_handling: Option<IsotopeHandling>,

    /// Workspace directory for results.
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: "qtof".to_string(),
            profile_overrides: None,
            candidates: 5,
            recalibrate: true,
            isotope_handling: None,
            output: None,
        }
    }
}

impl Config {
    pub fn apply_cli_args(&mut self, args: &Cli) -> Result<(), CliError> {
        if let Some(profile) = &args.profile {
            self.profile = profile.clone();
        }
        if let Some(candidates) = args.candidates {
            self.candidates = candidates;
        }
        if args.no_recalibration {
            self.recalibrate = false;
        }
        if let Some(mode) = &args.isotope_handling {
            self.isotope_handling = Some(match mode.as_str() {
                "omit" => IsotopeHandling::Omit,
                "filter" => IsotopeHandling::Filter,
                "score" => IsotopeHandling::Score,
                other => {
                    return Err(CliError::Config {
                        source: format!(
                            "unknown isotope handling '{}', expected omit, filter or score",
                            other
                        ),
                    });
                }
            });
        }
        if let Some(output) = &args.output_dir {
            self.output = Some(output.clone());
        }
        Ok(())
    }

    /// The measurement profile this run uses.
    pub fn resolve_profile(&self) -> Result<Profile, CliError> {
        if let Some(profile) = &self.profile_overrides {
            return Ok(profile.clone());
        }
        Profile::by_name(&self.profile).map_err(|e| CliError::Config {
            source: e.to_string(),
        })
    }
}
