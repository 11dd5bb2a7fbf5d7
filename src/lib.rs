//! Cloudstats Agent Library
//!
//! Process resource-usage tracking for a host telemetry agent. Each cycle the
//! agent samples the process table, folds shells, multiplexers and init into
//! the workloads they run, and keeps a sliding-window top-K of memory and CPU
//! consumers that survives restarts. Network interface speeds ride along in
//! the same report.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cloudstats_agent::{Agent, Config};
//!
//! let config = Config::default();
//! let mut agent = Agent::new(config).expect("valid rules");
//!
//! let report = agent.run_cycle().expect("cycle");
//! println!("{} processes", report.count);
//! for entry in &report.top_mem_graph {
//!     println!("{} {} ({} points)", entry.pid(), entry.command(), entry.points().len());
//! }
//! ```
//!
//! The pieces can also be used on their own: [`ProcessTree::build`] and
//! [`flatten`] turn flat records into reportable processes, and
//! [`SlidingTopTracker`] keeps the windowed ranking for any keyed metric.

pub mod agent;
pub mod client;
pub mod collectors;
pub mod config;
pub mod process;
pub mod report;
pub mod snapshot;
pub mod stats;
pub mod tracker;

// Re-export main types for convenience
pub use agent::{Agent, CycleError, Metric};
pub use client::HttpReportClient;
pub use collectors::{NetworkSampler, NetworkUsage};
pub use config::{Config, RulesConfig, TrackerConfig};
pub use process::{flatten, ProcessRecord, ProcessRules, ProcessSampler, ProcessTree};
pub use report::{CycleReport, GraphEntry};
pub use snapshot::TrackerError;
pub use stats::CycleStats;
pub use tracker::{ProcessKey, SeriesPoint, SlidingTopTracker, TopEntry, TrackerState};
