pub mod analyze;
pub mod input;
pub mod report;
pub mod settings;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "jbatch",
    version,
    about = "Group, validate and annotate spreadsheet journal-entry batches."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a CSV/XLSX batch against a client's reference data.
    Analyze {
        /// Path to the CSV or XLSX batch
        file: PathBuf,
        /// Reference data: a JSON snapshot (.json) or a SQLite database
        #[arg(long)]
        reference: PathBuf,
        /// Worksheet name for XLSX input (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[command(flatten)]
        overrides: SettingsOverrides,
    },
    /// Show (and optionally save) analysis settings.
    Settings {
        #[command(flatten)]
        overrides: SettingsOverrides,
        /// Persist the effective settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

/// Flags that override values from the settings file for one invocation.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Client whose reference data is used
    #[arg(long)]
    pub client: Option<String>,
    /// Column that explicitly identifies entries (e.g. 'Journal No')
    #[arg(long = "group-column")]
    pub group_column: Option<String>,
    /// Standard deviations from the account mean before an amount is flagged
    #[arg(long = "std-devs")]
    pub std_devs: Option<f64>,
    /// High-value threshold used when an account has no history, e.g. 10000.00
    #[arg(long = "high-value")]
    pub high_value: Option<String>,
    /// Groups analyzed in parallel (1 = sequential)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Deadline for the whole batch, in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
