//! CLI arguments and subcommands for cloudstats-agent.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use cloudstats_agent::config::{Config, ConfigFormat};

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Tracker selector for the `top` command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetricArg {
    Mem,
    Cpu,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "cloudstats-agent",
    about = "Host agent tracking the top memory and CPU consumers over a sliding window",
    long_about = "Host agent tracking the top memory and CPU consumers over a sliding window.\n\n\
                  Samples the process table periodically, folds shells, terminal multiplexers \
                  and init into the workloads they run, keeps a persisted top-K ranking per \
                  metric and posts a JSON report upstream.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Sampling interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Collector URL receiving the JSON report
    #[arg(long)]
    pub report_url: Option<String>,

    /// Directory holding the tracker snapshots
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Path to JSON test data file (uses synthetic data instead of the OS)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

impl Args {
    /// Applies CLI overrides on top of the loaded config (CLI > file > default).
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(v) = self.interval {
            cfg.interval_seconds = Some(v);
        }
        if let Some(v) = &self.report_url {
            cfg.report_url = Some(v.clone());
        }
        if let Some(v) = &self.state_dir {
            cfg.state_dir = Some(v.clone());
        }
        if let Some(v) = &self.test_data_file {
            cfg.test_data_file = Some(v.clone());
        }
        cfg.log_level = Some(format!("{:?}", self.log_level).to_lowercase());
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single cycle and print the report
    Once {
        /// Also post the report to the configured collector
        #[arg(long)]
        send: bool,
    },

    /// Sample once and print the processes that would be reported
    Tree {
        /// Also print the aggregated process tree
        #[arg(long)]
        verbose: bool,
    },

    /// Show the persisted top-K ranking
    Top {
        /// Which tracker to read
        #[arg(long, value_enum, default_value = "mem")]
        metric: MetricArg,

        /// Number of entries
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of processes to generate below pid 1
        #[arg(long, default_value_t = 40)]
        processes: usize,
    },

    /// Validate configuration, state directory and sampler
    Check,
}
