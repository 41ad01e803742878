// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `ethos`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ethos",
    version,
    about = "Scheduled goal progress verification, deadline sweeps and settlement.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Ethos.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Ethos.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETHOS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the job table with next fire times, then exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single job once, outside its schedule, and exit.
    #[arg(long, value_name = "JOB", conflicts_with = "history")]
    pub run_job: Option<String>,

    /// Print the daily execution history of a job and exit.
    #[arg(long, value_name = "JOB")]
    pub history: Option<String>,

    /// Number of calendar days covered by `--history`.
    #[arg(long, value_name = "N", default_value_t = 7)]
    pub days: u32,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
