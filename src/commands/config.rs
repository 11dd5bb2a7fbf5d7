//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use cloudstats_agent::config::{render_config, Config, ConfigFormat};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "cloudstats-agent.yaml",
            ConfigFormat::Json => "cloudstats-agent.json",
            ConfigFormat::Toml => "cloudstats-agent.toml",
        }),
    };

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Cloudstats Agent Configuration
# ==============================
#
# Scheduling
# ----------
# interval_seconds: 60         # Seconds between sampling cycles
#
# Reporting
# ---------
# report_url: null             # Collector URL (null = only log reports)
# report_timeout_seconds: 10   # HTTP timeout for one report
#
# Persistence
# -----------
# state_dir: /var/lib/cloudstats  # Holds mem_process.data and cpu_process.data
#
# Acquisition
# -----------
# sampler: auto                # auto, procfs or ps
# test_data_file: null         # Replay a JSON snapshot instead of the OS
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# Tracker
# -------
# tracker.window_seconds: 43200  # Sliding window (12h)
# tracker.keep_processes: 15     # Process keys kept between cycles
# tracker.top_n: 5               # Entries per graph in each report
#
# Collapse Rules
# --------------
# rules.self_pattern: cloudstats # Regex matching the agent's own executable name
# rules.init_pattern: ...        # Regex matching init (skipped, children kept)
# rules.high_order: [...]        # Shells, multiplexers and sudo folded into children
#
# Network
# -------
# network.enabled: true          # Interface speeds in each report (Linux)
# network.dev_path: /proc/net/dev
# network.skip_interfaces: [lo]
"#;

    format!("{comments}\n{yaml}")
}
