//! One sampling cycle, end to end.
//!
//! The agent owns the sampler, the collapse rules and both trackers. The
//! trackers are loaded once at startup and written back after every cycle.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::collectors::{NetworkSampler, NetworkUsage};
use crate::config::Config;
use crate::process::{
    flatten, select_sampler, ProcessRecord, ProcessRules, ProcessSampler, ProcessTree,
    RulesError, SampleError,
};
use crate::report::{assemble_report, CycleReport, ReportError};
use crate::snapshot::TrackerError;
use crate::stats::CycleStats;
use crate::tracker::{quantize_timestamp, ProcessKey, SlidingTopTracker};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to persist tracker state: {0}")]
    Persist(#[from] TrackerError),
    #[error("failed to assemble report: {0}")]
    Report(#[from] ReportError),
}

/// Which tracker a caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Mem,
    Cpu,
}

pub struct Agent {
    config: Config,
    rules: ProcessRules,
    sampler: Box<dyn ProcessSampler>,
    network: Option<NetworkSampler>,
    mem_tracker: SlidingTopTracker,
    cpu_tracker: SlidingTopTracker,
    mem_path: PathBuf,
    cpu_path: PathBuf,
    stats: Arc<CycleStats>,
}

impl Agent {
    /// Builds an agent with the sampler chosen for this host.
    pub fn new(config: Config) -> Result<Self, RulesError> {
        let sampler = select_sampler(&config);
        Self::with_sampler(config, sampler, Utc::now())
    }

    /// Builds an agent around an explicit sampler, restoring both trackers
    /// from the state directory (or starting them fresh at `now`).
    pub fn with_sampler(
        config: Config,
        sampler: Box<dyn ProcessSampler>,
        now: DateTime<Utc>,
    ) -> Result<Self, RulesError> {
        let rules = ProcessRules::from_config(&config.rules)?;
        let started = quantize_timestamp(now);
        let mem_path = config.mem_snapshot_path();
        let cpu_path = config.cpu_snapshot_path();
        let mem_tracker = SlidingTopTracker::load(&mem_path, &config.tracker, started);
        let cpu_tracker = SlidingTopTracker::load(&cpu_path, &config.tracker, started);
        let network = NetworkSampler::from_config(&config.network);
        info!(
            "Agent ready: sampler={}, network={}, state_dir={}, tracked mem={} cpu={}",
            sampler.name(),
            network.is_some(),
            config.state_dir().display(),
            mem_tracker.len(),
            cpu_tracker.len()
        );

        Ok(Self {
            config,
            rules,
            sampler,
            network,
            mem_tracker,
            cpu_tracker,
            mem_path,
            cpu_path,
            stats: Arc::new(CycleStats::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Takes a baseline network reading so the next cycle reports speeds.
    ///
    /// Returns whether a baseline was recorded.
    pub fn prime_network(&mut self) -> bool {
        match self.network.as_mut() {
            Some(network) => match network.prime(Utc::now()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Network baseline failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    pub fn stats(&self) -> Arc<CycleStats> {
        Arc::clone(&self.stats)
    }

    pub fn tracker(&self, metric: Metric) -> &SlidingTopTracker {
        match metric {
            Metric::Mem => &self.mem_tracker,
            Metric::Cpu => &self.cpu_tracker,
        }
    }

    /// Samples once and returns the number of sampled records, the aggregated
    /// tree and its flattened form. Trackers are left untouched.
    pub fn sample_flattened(
        &self,
    ) -> Result<(usize, ProcessTree, Vec<ProcessRecord>), SampleError> {
        let records = self.sampler.sample()?;
        let sampled = records.len();
        let tree = ProcessTree::build(records, &self.rules);
        let flat = flatten(&tree, &self.rules);
        Ok((sampled, tree, flat))
    }

    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.run_cycle_at(Utc::now())
    }

    /// Sample, aggregate, flatten, track, report and persist.
    ///
    /// Acquisition failures degrade to an empty snapshot. Persistence failures
    /// are returned, and the in-memory trackers stay usable for the next cycle.
    #[instrument(skip(self), fields(sampler = self.sampler.name()))]
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        match self.cycle(now) {
            Ok((report, sampled, reported)) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.stats.record_cycle(elapsed, sampled, reported);
                debug!(
                    "Cycle done in {:.3}s: {} sampled, {} reported, tracking mem={} cpu={}",
                    elapsed,
                    sampled,
                    reported,
                    self.mem_tracker.len(),
                    self.cpu_tracker.len()
                );
                Ok(report)
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn cycle(&mut self, now: DateTime<Utc>) -> Result<(CycleReport, usize, usize), CycleError> {
        let timestamp = quantize_timestamp(now);

        let records = match self.sampler.sample() {
            Ok(records) => records,
            Err(e) => {
                warn!("Process sampling failed, using an empty snapshot: {}", e);
                self.stats.record_sample_failure();
                Vec::new()
            }
        };
        let sampled = records.iter().filter(|r| !r.is_kernel_helper()).count();
        let network = self.sample_network(now);

        let tree = ProcessTree::build(records, &self.rules);
        let flat = flatten(&tree, &self.rules);

        self.mem_tracker.insert(
            flat.iter()
                .map(|r| (ProcessKey::new(r.pid, &r.command), r.mem_percent)),
            timestamp,
        );
        self.cpu_tracker.insert(
            flat.iter()
                .map(|r| (ProcessKey::new(r.pid, &r.command), r.cpu_percent)),
            timestamp,
        );

        let report = assemble_report(
            sampled,
            &flat,
            &mut self.mem_tracker,
            &mut self.cpu_tracker,
            self.config.tracker.top_n,
            timestamp,
            network,
        )?;
        self.persist_at(timestamp)?;

        Ok((report, sampled, flat.len()))
    }

    /// Network speeds since the previous cycle. A failed read leaves the
    /// section out of this report.
    fn sample_network(&mut self, now: DateTime<Utc>) -> Option<NetworkUsage> {
        let network = self.network.as_mut()?;
        match network.sample_at(now) {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!("Network sampling failed: {}", e);
                self.stats.record_sample_failure();
                None
            }
        }
    }

    /// Writes both trackers. Both writes are attempted even if the first fails.
    pub fn persist_at(&mut self, now: i64) -> Result<(), CycleError> {
        let mem = self.mem_tracker.save(&self.mem_path, now);
        let cpu = self.cpu_tracker.save(&self.cpu_path, now);
        mem?;
        cpu?;
        Ok(())
    }

    pub fn persist(&mut self) -> Result<(), CycleError> {
        self.persist_at(quantize_timestamp(Utc::now()))
    }
}
