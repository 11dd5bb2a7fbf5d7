//! cloudstats-agent
//!
//! Host agent with tracing logging. This is the main entry point that runs the
//! sampling loop and handles subcommands.

mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, level_filters::LevelFilter};

use cli::{Args, Commands, LogLevel};
use cloudstats_agent::config::{
    load_config, render_config, validate_effective_config, Config, DEFAULT_REPORT_TIMEOUT_SECONDS,
};
use cloudstats_agent::{Agent, CycleError, CycleReport, HttpReportClient};
use commands::{
    command_check, command_config, command_generate_testdata, command_once, command_top,
    command_tree,
};

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr so that command output on stdout stays machine-readable.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    debug!("Logging initialized with level: {:?}", args.log_level);
}

/// Loads the config file (unless disabled) and applies CLI overrides.
fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };
    args.apply_overrides(&mut config);
    Ok(config)
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Runs one cycle on the current worker thread, letting tokio move other
/// tasks (signal handling included) elsewhere while `ps` or the /proc walk
/// blocks. Needs the multi-threaded runtime.
fn run_cycle_blocking(agent: &mut Agent) -> Result<CycleReport, CycleError> {
    tokio::task::block_in_place(|| agent.run_cycle())
}

/// Runs sampling cycles on a fixed interval until a shutdown signal arrives.
///
/// Cycles never overlap: a slow cycle delays the next tick instead of
/// bunching missed ticks together.
async fn run_agent(config: Config) -> anyhow::Result<()> {
    let interval = Duration::from_secs(config.interval_seconds());
    let client = match config.report_url.as_deref() {
        Some(url) => {
            let timeout = config
                .report_timeout_seconds
                .unwrap_or(DEFAULT_REPORT_TIMEOUT_SECONDS);
            let client = HttpReportClient::new(url, Duration::from_secs(timeout))
                .with_context(|| format!("Failed to set up report client for {}", url))?;
            info!("Reports will be posted to {}", url);
            Some(client)
        }
        None => {
            info!("No report_url configured, reports will only be logged");
            None
        }
    };

    let mut agent = Agent::new(config).context("Failed to compile process collapse rules")?;
    let stats = agent.stats();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(
        "cloudstats-agent running: interval={}s, sampler={}",
        interval.as_secs(),
        agent.sampler_name()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_cycle_blocking(&mut agent) {
                    Ok(report) => match &client {
                        Some(client) => {
                            client.send(&report).await;
                        }
                        None => debug!(
                            "Report ready: {} processes, {} cpu / {} mem graph entries",
                            report.count,
                            report.top_cpu_graph.len(),
                            report.top_mem_graph.len()
                        ),
                    },
                    Err(e) => match stats.seconds_since_last_cycle() {
                        Some(secs) => error!("Cycle failed: {} (last good cycle {}s ago)", e, secs),
                        None => error!("Cycle failed: {} (no good cycle yet)", e),
                    },
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, exiting...");
                break;
            }
        }
    }

    if let Err(e) = agent.persist() {
        error!("Failed to persist tracker state on shutdown: {}", e);
    }
    info!("{}", stats.summary());
    debug!("\n{}", stats.render_table());
    Ok(())
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        print!("{}", render_config(&config, args.config_format)?);
        return Ok(());
    }

    setup_logging(&args);

    // Handle subcommands
    if let Some(command) = &args.command {
        // Config and GenerateTestdata don't need config validation
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), *format, *commented),
            Commands::GenerateTestdata { output, processes } => {
                return command_generate_testdata(output.clone(), *processes);
            }
            _ => {
                // Other commands need config validation
            }
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Once { send } => command_once(*send, config).await,
            Commands::Tree { verbose } => command_tree(*verbose, &config),
            Commands::Top { metric, count } => command_top(*metric, *count, &config),
            Commands::Check => command_check(&config),
            Commands::Config { .. } => unreachable!("Config handled above"),
            Commands::GenerateTestdata { .. } => unreachable!("GenerateTestdata handled above"),
        };
    }

    // Load configuration for agent mode
    let config = load_validated_config(&args)?;

    info!("Starting cloudstats-agent {}", env!("CARGO_PKG_VERSION"));
    run_agent(config).await?;
    info!("cloudstats-agent stopped gracefully");
    Ok(())
}
