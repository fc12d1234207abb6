//! Reader for the `.ms` text format: one compound per file, `>`-prefixed
//! directives followed by peak lines.
//!
//! ```text
//! >compound glucose
//! >parentmass 181.0707
//! >ionization [M+H]+
//! >ms1
//! 181.0707 1.0
//! 182.0741 0.066
//! >ms2
//! 85.028 0.4
//! 163.06 0.6
//! ```
//!
//! `>collision <energy>` opens an MS2 section as well; several MS2 sections
//! accumulate as separate spectra.

use std::path::Path;

use fragcore::{
    MolecularFormula,
    Peak,
    PrecursorIonType,
    Spectrum,
};
use fragseek::{
    ExperimentBuilder,
    Ms2Experiment,
};

use crate::errors::CliError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Ms1,
    Ms2,
}

pub fn parse_ms_file(path: &Path) -> Result<Ms2Experiment, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    let fallback_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    parse_ms(&content, &fallback_name)
}

fn parse_ms(content: &str, fallback_name: &str) -> Result<Ms2Experiment, CliError> {
    let mut name = fallback_name.to_string();
    let mut parent_mass = 0.0;
    let mut ion_type: Option<PrecursorIonType> = None;
    let mut formula: Option<MolecularFormula> = None;
    let mut ms1_peaks: Vec<Peak> = Vec::new();
    let mut ms2_spectra: Vec<Vec<Peak>> = Vec::new();
    let mut section = Section::None;

    for (line_number, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |msg: String| CliError::ParseError {
            msg: format!("{} (line {})", msg, line_number + 1),
        };

        if let Some(directive) = line.strip_prefix('>') {
            let (keyword, value) = directive
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim()))
                .unwrap_or((directive, ""));
            match keyword {
                "compound" => name = value.to_string(),
                "parentmass" => {
                    parent_mass = value
                        .parse()
                        .map_err(|_| parse_error(format!("invalid parentmass '{}'", value)))?;
                }
                "ionization" | "ion" => {
                    ion_type = Some(
                        PrecursorIonType::parse(value)
                            .map_err(|e| parse_error(e.to_string()))?,
                    );
                }
                "formula" => {
                    formula = Some(
                        MolecularFormula::parse(value)
                            .map_err(|e| parse_error(e.to_string()))?,
                    );
                }
                "charge" => {
                    let charge: i32 = value
                        .parse()
                        .map_err(|_| parse_error(format!("invalid charge '{}'", value)))?;
                    if ion_type.is_none() {
                        ion_type = Some(PrecursorIonType::unknown(charge));
                    }
                }
                "ms1" => section = Section::Ms1,
                "ms2" | "collision" => {
                    section = Section::Ms2;
                    ms2_spectra.push(Vec::new());
                }
                other => {
                    return Err(parse_error(format!("unknown directive '>{}'", other)));
                }
            }
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(mz), Some(intensity)) = (fields.next(), fields.next()) else {
            return Err(parse_error(format!("expected 'mz intensity', got '{}'", line)));
        };
        let peak = Peak {
            mz: mz
                .parse()
                .map_err(|_| parse_error(format!("invalid m/z '{}'", mz)))?,
            intensity: intensity
                .parse()
                .map_err(|_| parse_error(format!("invalid intensity '{}'", intensity)))?,
        };
        match section {
            Section::Ms1 => ms1_peaks.push(peak),
            Section::Ms2 => ms2_spectra
                .last_mut()
                .expect("section open implies a spectrum")
                .push(peak),
            Section::None => {
                return Err(parse_error(
                    "peak line before any >ms1 or >ms2 section".to_string(),
                ));
            }
        }
    }

    let ion_type = ion_type.ok_or_else(|| CliError::ParseError {
        msg: format!("{}: missing >ionization directive", name),
    })?;
    let mut builder = ExperimentBuilder::new()
        .name(name)
        .precursor_ion_type(ion_type)
        .ion_mass(parent_mass);
    if let Some(formula) = formula {
        builder = builder.neutral_formula(formula);
    }
    if !ms1_peaks.is_empty() {
        builder = builder.ms1(Spectrum::new(ms1_peaks));
    }
    for peaks in ms2_spectra {
        if !peaks.is_empty() {
            builder = builder.add_ms2(Spectrum::new(peaks));
        }
    }
    builder.build().map_err(CliError::from)
}
