mod cli;
mod config;
mod errors;
mod ms_file;
mod workspace;

use clap::Parser;
use fragseek::{
    Identifier,
    IdentifyOptions,
    Ms2Experiment,
};
use tracing::{
    error,
    info,
};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

use cli::Cli;
use config::Config;
use errors::CliError;
use workspace::WorkspaceWriter;

/// Converts verbosity flags to a log level string; RUST_LOG takes
/// precedence when set.
fn get_log_level(verbose: u8, quiet: u8) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level;
    }
    let effective = verbose as i8 - quiet as i8;
    match effective {
        2.. => "trace".to_string(),
        1 => "debug".to_string(),
        0 => "info".to_string(),
        -1 => "warn".to_string(),
        _ => "error".to_string(),
    }
}

fn process_experiment(
    identifier: &Identifier,
    experiment: &Ms2Experiment,
    options: &IdentifyOptions,
    auto_ionization: bool,
    writer: &mut WorkspaceWriter,
) -> Result<usize, CliError> {
    let results = if auto_ionization || experiment.precursor_ion_type.is_unknown() {
        let mut auto_options = options.clone();
        auto_options.white_list = Vec::new();
        identifier.identify_precursor_and_ionization(experiment, &auto_options)?
    } else {
        identifier.identify(experiment, options)?
    };
    writer.write_results(&experiment.name, &results)?;
    Ok(results.len())
}

fn main() -> Result<(), CliError> {
    let args = Cli::parse();

    let log_level = get_log_level(args.verbose, args.quiet);
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.parse().expect("valid log directive"))
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| CliError::Io {
                source: e.to_string(),
                path: Some(path.to_string_lossy().to_string()),
            })?;
            serde_json::from_reader(file)?
        }
        None => {
            info!("no config file provided, using default configuration");
            Config::default()
        }
    };
    config.apply_cli_args(&args)?;

    if args.ms_files.is_empty() {
        return Err(CliError::Config {
            source: "no input files, pass one or more .ms files".to_string(),
        });
    }
    for file in &args.ms_files {
        if !file.is_file() {
            return Err(CliError::Io {
                source: "input file does not exist".to_string(),
                path: Some(file.to_string_lossy().to_string()),
            });
        }
    }
    let output_dir = config.output.clone().ok_or_else(|| CliError::Config {
        source: "no output directory, pass --output-dir or set it in the config".to_string(),
    })?;

    let profile = config.resolve_profile()?;
    let identifier = Identifier::new(profile.clone());
    let options = IdentifyOptions {
        candidates: config.candidates,
        recalibrate: config.recalibrate,
        isotope_handling: config.isotope_handling,
        white_list: Vec::new(),
    };

    let mut writer = WorkspaceWriter::create(&output_dir)?;
    writer.write_profile(&config.profile, &profile)?;

    let mut failed: Vec<(std::path::PathBuf, CliError)> = Vec::new();
    let total = args.ms_files.len();
    info!("processing {} experiment file(s)", total);

    for (index, file) in args.ms_files.iter().enumerate() {
        info!("processing file {} of {}: {:?}", index + 1, total, file);
        let outcome = ms_file::parse_ms_file(file).and_then(|experiment| {
            process_experiment(
                &identifier,
                &experiment,
                &options,
                args.auto_ionization,
                &mut writer,
            )
        });
        match outcome {
            Ok(count) => info!("{:?}: {} candidate(s)", file, count),
            Err(e) => {
                error!("failed to process {:?}: {}", file, e);
                failed.push((file.clone(), e));
            }
        }
    }
    writer.finish()?;

    if !failed.is_empty() {
        error!("failed to process {} file(s):", failed.len());
        for (file, e) in &failed {
            error!("  {:?}: {}", file, e);
        }
        return Err(CliError::Config {
            source: format!("failed to process {} file(s)", failed.len()),
        });
    }
    Ok(())
}
