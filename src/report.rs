//! Outward-facing report payload.
//!
//! Shape: `{"count": n, "ps": "<json list>", "top_cpu_graph": [...], "top_mem_graph": [...],
//! "network": {...}}` where each graph entry is `[pid, command, [[timestamp_ms, value], ...]]`.
//! `network` is left out when network collection is disabled.

use serde::{Deserialize, Serialize};

use crate::collectors::NetworkUsage;
use crate::process::ProcessRecord;
use crate::tracker::{SlidingTopTracker, TopEntry};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to encode process list: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One charted process: pid, command, and `(timestamp_ms, value)` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntry(pub String, pub String, pub Vec<(i64, f64)>);

impl GraphEntry {
    pub fn pid(&self) -> &str {
        &self.0
    }

    pub fn command(&self) -> &str {
        &self.1
    }

    pub fn points(&self) -> &[(i64, f64)] {
        &self.2
    }
}

impl From<TopEntry> for GraphEntry {
    fn from(entry: TopEntry) -> Self {
        let points = entry
            .points
            .iter()
            .map(|p| (p.timestamp() * 1000, p.value()))
            .collect();
        GraphEntry(
            entry.key.pid().to_string(),
            entry.key.command().to_string(),
            points,
        )
    }
}

/// Payload sent upstream after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub count: usize,
    /// Flattened process list, serialized as a JSON string.
    pub ps: String,
    pub top_cpu_graph: Vec<GraphEntry>,
    pub top_mem_graph: Vec<GraphEntry>,
    /// Interface speeds in bytes per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkUsage>,
}

/// Builds the report from the flattened processes and both trackers.
///
/// `count` is the number of sampled processes; the trackers are maintained
/// (evicted and bounded) as a side effect of the top-K queries.
pub fn assemble_report(
    count: usize,
    processes: &[ProcessRecord],
    mem_tracker: &mut SlidingTopTracker,
    cpu_tracker: &mut SlidingTopTracker,
    top_n: usize,
    now: i64,
    network: Option<NetworkUsage>,
) -> Result<CycleReport, ReportError> {
    let graph = |tracker: &mut SlidingTopTracker| -> Vec<GraphEntry> {
        tracker
            .top_k(top_n, now)
            .into_iter()
            .map(GraphEntry::from)
            .collect()
    };

    Ok(CycleReport {
        count,
        ps: serde_json::to_string(processes)?,
        top_cpu_graph: graph(cpu_tracker),
        top_mem_graph: graph(mem_tracker),
        network,
    })
}
