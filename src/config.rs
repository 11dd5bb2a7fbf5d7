//! Configuration management for cloudstats-agent.
//!
//! This module handles loading, merging, and validating configuration from files.
//! It supports YAML, JSON, and TOML formats. CLI overrides are applied by the
//! binary on top of the loaded file.

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_REPORT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_STATE_DIR: &str = "/var/lib/cloudstats";
pub const DEFAULT_SAMPLER: &str = "auto";
pub const DEFAULT_NETDEV_PATH: &str = "/proc/net/dev";

/// File names of the persisted tracker snapshots inside `state_dir`.
pub const MEM_SNAPSHOT_FILE: &str = "mem_process.data";
pub const CPU_SNAPSHOT_FILE: &str = "cpu_process.data";

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Sliding window tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Trailing window retained per process, in seconds (default: 12h)
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,

    /// Maximum number of process keys kept between cycles (default: 15)
    #[serde(default = "default_keep_processes")]
    pub keep_processes: usize,

    /// Entries per graph in each report (default: 5)
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_window_seconds() -> i64 {
    3600 * 12
}
fn default_keep_processes() -> usize {
    15
}
fn default_top_n() -> usize {
    5
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            keep_processes: default_keep_processes(),
            top_n: default_top_n(),
        }
    }
}

/// Process tree collapse rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Regex matched against an executable name to recognise the agent itself
    #[serde(default = "default_self_pattern", alias = "self-pattern")]
    pub self_pattern: String,

    /// Regex matched against a command to recognise init
    #[serde(default = "default_init_pattern", alias = "init-pattern")]
    pub init_pattern: String,

    /// Executable names collapsed into their children
    #[serde(default = "default_high_order", alias = "high-order")]
    pub high_order: Vec<String>,
}

fn default_self_pattern() -> String {
    "cloudstats".into()
}
fn default_init_pattern() -> String {
    r"\Ainit\s?(\[\d+\])?\z".into()
}
fn default_high_order() -> Vec<String> {
    // Login shells show up as "-bash" etc.
    ["bash", "zsh", "fish", "sh", "ksh", "tmux", "screen", "sudo"]
        .iter()
        .flat_map(|name| [name.to_string(), format!("-{}", name)])
        .collect()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            self_pattern: default_self_pattern(),
            init_pattern: default_init_pattern(),
            high_order: default_high_order(),
        }
    }
}

/// Network interface throughput collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Report per-interface speeds (default: on for Linux)
    #[serde(default = "default_network_enabled")]
    pub enabled: bool,

    /// Interface counter table in /proc/net/dev format
    #[serde(default = "default_dev_path", alias = "dev-path")]
    pub dev_path: PathBuf,

    /// Interfaces left out of the report
    #[serde(default = "default_skip_interfaces", alias = "skip-interfaces")]
    pub skip_interfaces: Vec<String>,
}

fn default_network_enabled() -> bool {
    cfg!(target_os = "linux")
}
fn default_dev_path() -> PathBuf {
    PathBuf::from(DEFAULT_NETDEV_PATH)
}
fn default_skip_interfaces() -> Vec<String> {
    vec!["lo".to_string()]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: default_network_enabled(),
            dev_path: default_dev_path(),
            skip_interfaces: default_skip_interfaces(),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Scheduling
    #[serde(alias = "interval")]
    pub interval_seconds: Option<u64>,

    // Reporting
    #[serde(alias = "report-url")]
    pub report_url: Option<String>,
    #[serde(alias = "report-timeout-seconds")]
    pub report_timeout_seconds: Option<u64>,

    // Persistence
    #[serde(alias = "state-dir")]
    pub state_dir: Option<PathBuf>,

    // Acquisition
    /// "auto" | "procfs" | "ps"
    pub sampler: Option<String>,
    /// Path to JSON test data file (uses synthetic data instead of the OS)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: Some(DEFAULT_INTERVAL_SECONDS),
            report_url: None,
            report_timeout_seconds: Some(DEFAULT_REPORT_TIMEOUT_SECONDS),
            state_dir: Some(PathBuf::from(DEFAULT_STATE_DIR)),
            sampler: Some(DEFAULT_SAMPLER.into()),
            test_data_file: None,
            log_level: Some("info".into()),
            tracker: TrackerConfig::default(),
            rules: RulesConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    pub fn mem_snapshot_path(&self) -> PathBuf {
        self.state_dir().join(MEM_SNAPSHOT_FILE)
    }

    pub fn cpu_snapshot_path(&self) -> PathBuf {
        self.state_dir().join(CPU_SNAPSHOT_FILE)
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.interval_seconds() == 0 {
        return Err("interval_seconds must be greater than 0".into());
    }

    let tracker = &cfg.tracker;
    if tracker.window_seconds <= 0 {
        return Err("tracker.window_seconds must be greater than 0".into());
    }
    if tracker.keep_processes == 0 {
        return Err("tracker.keep_processes must be greater than 0".into());
    }
    if tracker.top_n == 0 {
        return Err("tracker.top_n must be greater than 0".into());
    }
    if tracker.top_n > tracker.keep_processes {
        return Err(format!(
            "tracker.top_n ({}) cannot exceed tracker.keep_processes ({})",
            tracker.top_n, tracker.keep_processes
        )
        .into());
    }

    match cfg.sampler.as_deref().unwrap_or(DEFAULT_SAMPLER) {
        "auto" | "procfs" | "ps" => {}
        other => {
            return Err(format!(
                "Invalid sampler '{}', expected 'auto', 'procfs' or 'ps'",
                other
            )
            .into());
        }
    }

    if let Err(e) = Regex::new(&cfg.rules.self_pattern) {
        return Err(format!("Invalid rules.self_pattern: {}", e).into());
    }
    if let Err(e) = Regex::new(&cfg.rules.init_pattern) {
        return Err(format!("Invalid rules.init_pattern: {}", e).into());
    }

    if let Some(url) = cfg.report_url.as_deref() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("report_url must be an http(s) URL, got '{}'", url).into());
        }
    }

    if let Some(path) = &cfg.test_data_file {
        if !path.exists() {
            return Err(format!("Test data file not found: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/cloudstats/agent.yaml",
            "/etc/cloudstats/agent.yml",
            "/etc/cloudstats/agent.json",
            "./cloudstats-agent.yaml",
            "./cloudstats-agent.yml",
            "./cloudstats-agent.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if path.to_string_lossy().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses configuration content, picking the format from a file extension.
pub fn parse_config(
    content: &str,
    extension: Option<&str>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}
