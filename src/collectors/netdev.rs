//! Network interface throughput collector.
//!
//! Reads the cumulative byte counters from /proc/net/dev once per cycle and
//! turns the difference to the previous reading into bytes per second.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::NetworkConfig;
use crate::process::SampleError;

/// Cumulative byte counters of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetDevCounters {
    pub receive_bytes: u64,
    pub transmit_bytes: u64,
}

/// One interface: name, rx, tx and total speed in bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSpeed(pub String, pub f64, pub f64, pub f64);

impl InterfaceSpeed {
    fn idle(name: &str) -> Self {
        InterfaceSpeed(name.to_string(), 0.0, 0.0, 0.0)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn rx(&self) -> f64 {
        self.1
    }

    pub fn tx(&self) -> f64 {
        self.2
    }

    pub fn total(&self) -> f64 {
        self.3
    }
}

/// Network section of the report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkUsage {
    pub all: Vec<InterfaceSpeed>,
    pub rx_speed: f64,
    pub tx_speed: f64,
}

/// Parses /proc/net/dev content into per-interface counters.
///
/// The first two lines are headers. Lines without a `name:` prefix or with
/// too few columns are skipped; unparsable counters read as zero.
pub fn parse_netdev(content: &str) -> HashMap<String, NetDevCounters> {
    let mut stats = HashMap::new();

    for line in content.lines().skip(2) {
        let Some((interface, data)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = data.split_whitespace().collect();
        if values.len() < 9 {
            continue;
        }

        stats.insert(
            interface.trim().to_string(),
            NetDevCounters {
                receive_bytes: values[0].parse().unwrap_or(0),
                transmit_bytes: values[8].parse().unwrap_or(0),
            },
        );
    }

    stats
}

/// Per-cycle network sampler.
///
/// The first reading only sets the baseline, so every interface reports zero
/// speed until a second reading exists.
#[derive(Debug)]
pub struct NetworkSampler {
    path: PathBuf,
    skip_interfaces: Vec<String>,
    previous: Option<(DateTime<Utc>, HashMap<String, NetDevCounters>)>,
}

impl NetworkSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            skip_interfaces: vec!["lo".to_string()],
            previous: None,
        }
    }

    /// Returns `None` when network collection is disabled.
    pub fn from_config(cfg: &NetworkConfig) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        Some(Self {
            path: cfg.dev_path.clone(),
            skip_interfaces: cfg.skip_interfaces.clone(),
            previous: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_counters(&self) -> Result<HashMap<String, NetDevCounters>, SampleError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SampleError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut counters = parse_netdev(&content);
        counters.retain(|name, _| !self.skip_interfaces.iter().any(|skip| skip == name));
        Ok(counters)
    }

    /// Records a baseline reading without producing speeds.
    pub fn prime(&mut self, now: DateTime<Utc>) -> Result<(), SampleError> {
        let counters = self.read_counters()?;
        self.previous = Some((now, counters));
        Ok(())
    }

    /// Reads the counters and returns speeds since the previous reading.
    ///
    /// A failed read keeps the previous baseline.
    pub fn sample_at(&mut self, now: DateTime<Utc>) -> Result<NetworkUsage, SampleError> {
        let present = self.read_counters()?;
        let usage = match &self.previous {
            Some((then, past)) => {
                let elapsed = (now - *then).num_milliseconds() as f64 / 1000.0;
                speeds(&present, past, elapsed)
            }
            None => speeds(&present, &HashMap::new(), 0.0),
        };
        debug!(
            "Network: {} interfaces, rx {:.0} B/s, tx {:.0} B/s",
            usage.all.len(),
            usage.rx_speed,
            usage.tx_speed
        );
        self.previous = Some((now, present));
        Ok(usage)
    }
}

/// Counter deltas over `elapsed` seconds, clamped at zero.
///
/// Interfaces without a past reading, or a non-positive elapsed time, report
/// zero. Counter resets show up as negative deltas and are clamped too.
fn speeds(
    present: &HashMap<String, NetDevCounters>,
    past: &HashMap<String, NetDevCounters>,
    elapsed: f64,
) -> NetworkUsage {
    let mut names: Vec<&String> = present.keys().collect();
    names.sort();

    let all: Vec<InterfaceSpeed> = names
        .into_iter()
        .map(|name| match past.get(name) {
            Some(then) if elapsed > 0.0 => {
                let now = &present[name];
                let rx = (now.receive_bytes as f64 - then.receive_bytes as f64) / elapsed;
                let tx = (now.transmit_bytes as f64 - then.transmit_bytes as f64) / elapsed;
                InterfaceSpeed(name.clone(), rx.max(0.0), tx.max(0.0), (rx + tx).max(0.0))
            }
            _ => InterfaceSpeed::idle(name),
        })
        .collect();

    NetworkUsage {
        rx_speed: all.iter().map(InterfaceSpeed::rx).sum(),
        tx_speed: all.iter().map(InterfaceSpeed::tx).sum(),
        all,
    }
}
