//! CLI argument definitions for the ADaM derivation pipeline.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "adam",
    version,
    about = "Derive ADaM analysis datasets from SDTM domains",
    long_about = "Derive ADaM analysis datasets (ADSL, ADAE, ADLBC, ADTTE) from SDTM \
                  domain CSV files.\n\n\
                  Datasets are shaped by an analysis specification directory and \
                  validated before they are written."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the derivation pipeline and write the analysis datasets.
    Derive(DeriveArgs),

    /// List the datasets declared in the analysis specification.
    Datasets(DatasetsArgs),
}

#[derive(Args)]
pub struct DeriveArgs {
    /// Configuration file (default: ./adam.toml when present).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the SDTM domain CSV files.
    #[arg(long = "sdtm-dir", value_name = "DIR")]
    pub sdtm_dir: Option<PathBuf>,

    /// Analysis specification directory.
    #[arg(long = "spec-dir", value_name = "DIR")]
    pub spec_dir: Option<PathBuf>,

    /// Output directory for analysis datasets (default: <SDTM_DIR>/adam).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Dataset to derive; repeat for several. Upstream datasets are added
    /// automatically. Defaults to all datasets.
    #[arg(long = "dataset", value_name = "NAME")]
    pub datasets: Vec<String>,

    /// Fail ADTTE for subjects with neither an event nor a censoring date.
    #[arg(long = "strict")]
    pub strict: bool,

    /// Derive and validate without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DatasetsArgs {
    /// Configuration file (default: ./adam.toml when present).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Analysis specification directory.
    #[arg(long = "spec-dir", value_name = "DIR")]
    pub spec_dir: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
