//! Sliding-window top-K tracking of per-process metric series.
//!
//! A `SlidingTopTracker` keeps, per process key, the points inserted during the
//! trailing window, drops keys whose points all fell out of the window, and
//! bounds the number of keys by keeping only the highest window averages.
//!
//! Window arithmetic uses wall-clock epoch seconds supplied by the caller. The
//! window start only ever moves forward, which is the sole defence against the
//! clock stepping backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::process::record::finite_or_zero;
use crate::snapshot::{read_state, write_state, TrackerError};

/// Separator between pid and command inside a process key.
pub const KEY_SEPARATOR: char = '\0';

/// Forward bias applied before truncating a cycle timestamp to the minute.
pub const QUANTIZE_BIAS_SECONDS: i64 = 5;

/// `pid + "\0" + command`, distinguishing reused pids running different commands.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessKey(String);

impl ProcessKey {
    pub fn new(pid: impl fmt::Display, command: &str) -> Self {
        let command = command.replace(KEY_SEPARATOR, " ");
        Self(format!("{}{}{}", pid, KEY_SEPARATOR, command))
    }

    pub fn pid(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(pid, _)| pid)
            .unwrap_or(&self.0)
    }

    pub fn command(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(_, command)| command)
            .unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid(), self.command())
    }
}

/// One sample: epoch seconds and value. Serialized as `[timestamp, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint(pub i64, pub f64);

impl SeriesPoint {
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    pub fn value(&self) -> f64 {
        self.1
    }
}

/// Everything a tracker persists: the series per key and the window start.
///
/// Serializes to the snapshot file layout
/// `{"graph": {"<pid>\u0000<command>": [[ts, value], ...]}, "start_time": ts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    #[serde(rename = "graph")]
    pub series: BTreeMap<ProcessKey, Vec<SeriesPoint>>,
    #[serde(rename = "start_time")]
    pub window_start: i64,
}

impl TrackerState {
    pub fn fresh(now: i64) -> Self {
        Self {
            series: BTreeMap::new(),
            window_start: now,
        }
    }
}

/// A key selected by `top_k`, with its window average and retained points.
#[derive(Debug, Clone, PartialEq)]
pub struct TopEntry {
    pub key: ProcessKey,
    pub average: f64,
    pub points: Vec<SeriesPoint>,
}

/// Plain (not time-weighted) mean of the point values.
pub fn window_average(points: &[SeriesPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(SeriesPoint::value).sum::<f64>() / points.len() as f64
}

/// Rounds a cycle's wall-clock time to the minute, after a small forward bias,
/// so samples taken with polling jitter share a chart axis.
pub fn quantize_timestamp(now: DateTime<Utc>) -> i64 {
    let biased = now.timestamp() + QUANTIZE_BIAS_SECONDS;
    biased - biased.rem_euclid(60)
}

/// Time-windowed top-K aggregator for one metric.
#[derive(Debug, Clone)]
pub struct SlidingTopTracker {
    window_seconds: i64,
    keep_processes: usize,
    state: TrackerState,
}

impl SlidingTopTracker {
    /// Creates an empty tracker whose window starts at `now`.
    pub fn new(config: &TrackerConfig, now: i64) -> Self {
        Self::from_state(config, TrackerState::fresh(now))
    }

    pub fn from_state(config: &TrackerConfig, state: TrackerState) -> Self {
        Self {
            window_seconds: config.window_seconds,
            keep_processes: config.keep_processes,
            state,
        }
    }

    /// Restores a tracker from a snapshot file.
    ///
    /// A missing, unreadable or malformed snapshot yields an empty tracker
    /// starting at `now`; loading never fails.
    pub fn load(path: &Path, config: &TrackerConfig, now: i64) -> Self {
        match read_state(path) {
            Some(state) => {
                debug!(
                    "Restored {} tracked processes from {}",
                    state.series.len(),
                    path.display()
                );
                Self::from_state(config, state)
            }
            None => Self::new(config, now),
        }
    }

    /// Appends one point per key. Does not evict or bound.
    ///
    /// Non-finite values are stored as zero; JSON has no encoding for them.
    pub fn insert<I>(&mut self, values: I, timestamp: i64)
    where
        I: IntoIterator<Item = (ProcessKey, f64)>,
    {
        for (key, value) in values {
            self.state
                .series
                .entry(key)
                .or_default()
                .push(SeriesPoint(timestamp, finite_or_zero(value)));
        }
    }

    /// Advances the window (forward only), trims stale points and drops keys
    /// left empty, then keeps only the `keep_processes` best averages.
    pub fn evict_and_bound(&mut self, now: i64) {
        let candidate = now - self.window_seconds;
        if candidate > self.state.window_start {
            self.state.window_start = candidate;
        }
        let window_start = self.state.window_start;

        let before = self.state.series.len();
        self.state.series.retain(|_, points| {
            match points.iter().position(|p| p.timestamp() >= window_start) {
                Some(first) => {
                    points.drain(..first);
                    !points.is_empty()
                }
                None => false,
            }
        });
        let stale = before - self.state.series.len();

        let mut dropped = 0;
        if self.state.series.len() > self.keep_processes {
            let keep: Vec<ProcessKey> = self
                .ranked()
                .into_iter()
                .take(self.keep_processes)
                .map(|(key, _)| key.clone())
                .collect();
            let before = self.state.series.len();
            self.state.series.retain(|key, _| keep.contains(key));
            dropped = before - self.state.series.len();
        }

        if stale > 0 || dropped > 0 {
            debug!(
                "Tracker maintenance: {} stale keys evicted, {} low-ranked keys dropped, window starts at {}",
                stale, dropped, window_start
            );
        }
    }

    /// Runs maintenance, then returns at most `k` keys by descending average.
    ///
    /// Equal averages keep lexicographic key order.
    pub fn top_k(&mut self, k: usize, now: i64) -> Vec<TopEntry> {
        self.evict_and_bound(now);
        self.ranked()
            .into_iter()
            .take(k)
            .map(|(key, average)| TopEntry {
                key: key.clone(),
                average,
                points: self.state.series[key].clone(),
            })
            .collect()
    }

    /// Runs maintenance, then writes the snapshot (temp file + rename).
    pub fn save(&mut self, path: &Path, now: i64) -> Result<(), TrackerError> {
        self.evict_and_bound(now);
        write_state(path, &self.state)
    }

    /// Keys with their averages, stably sorted by descending average.
    fn ranked(&self) -> Vec<(&ProcessKey, f64)> {
        let mut ranked: Vec<(&ProcessKey, f64)> = self
            .state
            .series
            .iter()
            .map(|(key, points)| (key, window_average(points)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn window_start(&self) -> i64 {
        self.state.window_start
    }

    pub fn series(&self, key: &ProcessKey) -> Option<&[SeriesPoint]> {
        self.state.series.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.state.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.series.is_empty()
    }
}
