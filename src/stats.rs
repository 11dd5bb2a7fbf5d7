//! Runtime statistics for the agent's own collection cycles.
//!
//! Tracks cycle duration, sampled process counts, and success/failure
//! counters so the agent can log how it is doing.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::Instant;

/// Running statistics for a single metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Debug, Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> RunningStat {
        self.inner.lock().map(|s| *s).unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct CycleStats {
    pub cycle_duration_seconds: Stat,
    pub sampled_processes: Stat,
    pub reported_processes: Stat,
    pub successful_cycles: AtomicU64,
    pub failed_cycles: AtomicU64,
    pub sample_failures: AtomicU64,
    pub start_time: Instant,
    pub last_cycle_time: StdRwLock<Option<Instant>>,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self {
            cycle_duration_seconds: Stat::default(),
            sampled_processes: Stat::default(),
            reported_processes: Stat::default(),
            successful_cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            sample_failures: AtomicU64::new(0),
            start_time: Instant::now(),
            last_cycle_time: StdRwLock::new(None),
        }
    }
}

impl CycleStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, duration_seconds: f64, sampled: usize, reported: usize) {
        self.cycle_duration_seconds.add_sample(duration_seconds);
        self.sampled_processes.add_sample(sampled as f64);
        self.reported_processes.add_sample(reported as f64);
        self.successful_cycles.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_cycle_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_failure(&self) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_failure(&self) {
        self.sample_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_cycles(&self) -> u64 {
        self.successful_cycles.load(Ordering::Relaxed) + self.failed_cycles.load(Ordering::Relaxed)
    }

    pub fn success_rate(&self) -> f64 {
        let success = self.successful_cycles.load(Ordering::Relaxed);
        let total = self.total_cycles();
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn seconds_since_last_cycle(&self) -> Option<u64> {
        self.last_cycle_time
            .read()
            .ok()
            .and_then(|guard| guard.map(|t| t.elapsed().as_secs()))
    }

    /// One-line summary for the shutdown log.
    pub fn summary(&self) -> String {
        let duration = self.cycle_duration_seconds.snapshot();
        let sampled = self.sampled_processes.snapshot();
        format!(
            "cycles: {} ({:.1}% ok) | avg duration: {:.3}s | max duration: {:.3}s | avg processes: {:.1} | uptime: {}s",
            self.total_cycles(),
            self.success_rate(),
            duration.avg(),
            duration.max(),
            sampled.avg(),
            self.uptime_seconds()
        )
    }

    pub fn render_table(&self) -> String {
        let left_col = 24usize;
        let col_w = 10usize;
        let mut out = String::new();

        writeln!(out, "AGENT CYCLE STATS").ok();
        writeln!(out, "=================").ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        let rows = [
            ("cycle_duration (s)", self.cycle_duration_seconds.snapshot(), 3),
            ("sampled_processes", self.sampled_processes.snapshot(), 0),
            ("reported_processes", self.reported_processes.snapshot(), 0),
        ];
        for (label, stat, precision) in rows {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.*}", precision, stat.last()),
                format!("{:.*}", precision.max(1), stat.avg()),
                format!("{:.*}", precision, stat.max()),
                format!("{:.*}", precision, stat.min()),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "successful: {} | failed: {} | sample failures: {} | uptime: {}s",
            self.successful_cycles.load(Ordering::Relaxed),
            self.failed_cycles.load(Ordering::Relaxed),
            self.sample_failures.load(Ordering::Relaxed),
            self.uptime_seconds()
        )
        .ok();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat_tracks_min_max_avg() {
        let mut s = RunningStat::default();
        assert_eq!(s.avg(), 0.0);
        for v in [3.0, 1.0, 5.0] {
            s.add(v);
        }
        assert_eq!(s.count(), 3);
        assert_eq!(s.min(), 1.0);
        assert_eq!(s.max(), 5.0);
        assert_eq!(s.last(), 5.0);
        assert!((s.avg() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cycle_stats_success_rate() {
        let stats = CycleStats::new();
        assert_eq!(stats.success_rate(), 100.0);
        assert!(stats.seconds_since_last_cycle().is_none());

        stats.record_cycle(0.2, 100, 12);
        stats.record_cycle(0.4, 120, 14);
        stats.record_cycle(0.3, 110, 13);
        stats.record_failure();

        assert_eq!(stats.total_cycles(), 4);
        assert!((stats.success_rate() - 75.0).abs() < 1e-9);
        assert!(stats.seconds_since_last_cycle().is_some());
        assert!((stats.sampled_processes.snapshot().avg() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_render_table_lists_rows() {
        let stats = CycleStats::new();
        stats.record_cycle(0.25, 42, 7);
        stats.record_sample_failure();
        let table = stats.render_table();
        assert!(table.contains("AGENT CYCLE STATS"));
        assert!(table.contains("cycle_duration (s)"));
        assert!(table.contains("sample failures: 1"));
        assert!(stats.summary().contains("cycles: 1"));
    }
}
