use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Molecular formula identification from tandem MS", long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (can be repeated: -v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease logging verbosity (can be repeated: -q for warn, -qq for error)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Path to the JSON configuration file (optional, uses defaults if not provided)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input experiment files (.ms text format, one compound per file)
    #[arg(value_name = "FILE")]
    pub ms_files: Vec<PathBuf>,

    /// Path to the output workspace directory (will over-write the config file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Measurement profile preset: qtof or orbitrap (will over-write the config file)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Number of candidates to report per experiment
    #[arg(short = 'k', long)]
    pub candidates: Option<usize>,

    /// Skip the recalibration pass
    #[arg(long)]
    pub no_recalibration: bool,

    /// Isotope pattern handling: omit, filter or score
    #[arg(long, value_name = "MODE")]
    pub isotope_handling: Option<String>,

    /// Try every ion mode for the precursor charge instead of trusting the
    /// ionization given in the input file
    #[arg(long)]
    pub auto_ionization: bool,
}
