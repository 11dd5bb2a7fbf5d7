//! Top command implementation.
//!
//! Reads a persisted tracker snapshot and prints its current ranking.

use chrono::{TimeZone, Utc};

use cloudstats_agent::config::Config;
use cloudstats_agent::tracker::{quantize_timestamp, SlidingTopTracker};

use crate::cli::MetricArg;

/// Prints the top-K of the memory or CPU snapshot.
pub fn command_top(
    metric: MetricArg,
    count: Option<usize>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (label, path) = match metric {
        MetricArg::Mem => ("memory", config.mem_snapshot_path()),
        MetricArg::Cpu => ("cpu", config.cpu_snapshot_path()),
    };
    let k = count.unwrap_or(config.tracker.top_n);
    let now = quantize_timestamp(Utc::now());

    // Maintenance only touches the in-memory copy; the snapshot is not rewritten.
    let mut tracker = SlidingTopTracker::load(&path, &config.tracker, now);
    let entries = tracker.top_k(k, now);

    println!("📊 Top {} {} consumers ({})", k, label, path.display());
    let window_start = Utc
        .timestamp_opt(tracker.window_start(), 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| tracker.window_start().to_string());
    println!("   Window starts: {}", window_start);

    if entries.is_empty() {
        println!("   ⚠️  No tracked processes");
        return Ok(());
    }

    for (rank, entry) in entries.iter().enumerate() {
        let last = entry.points.last().map(|p| p.value()).unwrap_or(0.0);
        println!(
            "   {:>2}. {:>7}  avg {:>6.2}%  last {:>6.2}%  points {:>4}  {}",
            rank + 1,
            entry.key.pid(),
            entry.average,
            last,
            entry.points.len(),
            entry.key.command()
        );
    }
    Ok(())
}
