use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Xuan Wu, Osamu Miyashita, Florence Tama",
    version,
    about = "nmfit - Normal-mode flexible fitting of molecular conformations against AFM images.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel image simulation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the iterative flexible fitting of a structure against a target AFM image.
    Fit(FitArgs),
    /// Re-analyze the convergence trajectory of a finished run and pick the best step.
    Analyze(AnalyzeArgs),
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Path to the initial conformation PDB file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the target AFM image in TSV format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub target: PathBuf,

    /// Directory the run workspace will be created in.
    #[arg(short = 'd', long = "run-dir", required = true, value_name = "PATH")]
    pub run_dir: PathBuf,

    /// Path to the main configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Reference PDB file for RMSD-to-reference bookkeeping.
    #[arg(long, value_name = "PATH")]
    pub reference: Option<PathBuf>,

    // --- Overrides for the configuration file ---
    /// Override the combined deformation amplitude.
    #[arg(short = 'a', long, value_name = "FLOAT")]
    pub amplitude: Option<f64>,

    /// Override the first normal mode of the swept range.
    #[arg(long, value_name = "INT")]
    pub first_mode: Option<u32>,

    /// Override the last normal mode of the swept range.
    #[arg(long, value_name = "INT")]
    pub last_mode: Option<u32>,

    /// Override the mode-selection strategy (slope, maxcc, maxcc_force_move).
    #[arg(long, value_name = "NAME")]
    pub mode_selection: Option<String>,

    /// Override the termination strategy (numeric, average, single).
    #[arg(long, value_name = "NAME")]
    pub termination: Option<String>,

    /// Override the iteration budget.
    #[arg(short = 'n', long, value_name = "INT")]
    pub iterations: Option<usize>,

    /// Start without the interactive parameter confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Path to the trajectory log of a finished run.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub log: PathBuf,

    /// Decay fractions mapped to candidate steps, best first to last.
    #[arg(long, value_name = "FLOAT", value_delimiter = ',', num_args(1..))]
    pub fractions: Option<Vec<f64>>,
}
