//! Integration tests for the sliding-window tracker and its snapshots.
//!
//! These tests drive `SlidingTopTracker` through long randomized insert and
//! maintenance sequences and check the window, eviction and ranking
//! guarantees after every step, then exercise the snapshot files on disk.

use cloudstats_agent::config::TrackerConfig;
use cloudstats_agent::tracker::window_average;
use cloudstats_agent::{ProcessKey, SeriesPoint, SlidingTopTracker, TrackerState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::tempdir;

fn config(window_seconds: i64, keep_processes: usize) -> TrackerConfig {
    TrackerConfig {
        window_seconds,
        keep_processes,
        top_n: keep_processes.min(5),
    }
}

#[test]
fn test_worker_scenario_returns_full_series() {
    let mut tracker = SlidingTopTracker::new(&config(3600, 15), 0);
    let key = ProcessKey::new(42, "worker");
    for t in [0, 60, 120] {
        tracker.insert([(key.clone(), 10.0)], t);
    }

    let top = tracker.top_k(1, 130);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].key.as_str(), "42\u{0}worker");
    assert_eq!(top[0].average, 10.0);
    assert_eq!(
        top[0].points,
        vec![SeriesPoint(0, 10.0), SeriesPoint(60, 10.0), SeriesPoint(120, 10.0)]
    );
}

#[test]
fn test_single_stale_point_deletes_key() {
    let mut tracker = SlidingTopTracker::new(&config(100, 15), 0);
    tracker.insert([(ProcessKey::new(42, "worker"), 10.0)], 0);

    tracker.evict_and_bound(500);
    assert_eq!(tracker.window_start(), 400);
    assert!(tracker.is_empty());
}

#[test]
fn test_randomized_maintenance_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let keep = 15;
    let mut tracker = SlidingTopTracker::new(&config(600, keep), 0);
    let mut last_window_start = tracker.window_start();
    let mut now = 0i64;

    for _ in 0..300 {
        // Mostly forward, occasionally the clock steps back.
        now += rng.gen_range(-90..180);
        let batch: Vec<(ProcessKey, f64)> = (0..rng.gen_range(0..8))
            .map(|_| {
                let pid = rng.gen_range(100..140);
                (ProcessKey::new(pid, "job"), rng.gen_range(0.0..100.0))
            })
            .collect();
        tracker.insert(batch, now);

        let k = rng.gen_range(0..10);
        let top = tracker.top_k(k, now);

        let window_start = tracker.window_start();
        assert!(window_start >= last_window_start, "window start moved back");
        last_window_start = window_start;

        assert!(tracker.len() <= keep);
        for points in tracker.state().series.values() {
            assert!(!points.is_empty());
            assert!(points.iter().all(|p| p.timestamp() >= window_start));
        }

        assert!(top.len() <= k);
        assert!(top.windows(2).all(|w| w[0].average >= w[1].average));
        for entry in &top {
            assert_eq!(entry.average, window_average(&entry.points));
        }
    }
}

#[test]
fn test_bound_drops_lowest_averages_only() {
    let mut tracker = SlidingTopTracker::new(&config(3600, 3), 0);
    tracker.insert(
        (1..=6).map(|pid| (ProcessKey::new(pid, "svc"), pid as f64)),
        10,
    );
    tracker.evict_and_bound(20);

    let kept: Vec<&str> = tracker
        .state()
        .series
        .keys()
        .map(|k| k.pid())
        .collect();
    assert_eq!(kept, vec!["4", "5", "6"]);
}

#[test]
fn test_equal_averages_rank_in_key_order() {
    let mut tracker = SlidingTopTracker::new(&config(3600, 15), 0);
    tracker.insert(
        [
            (ProcessKey::new(30, "c"), 5.0),
            (ProcessKey::new(10, "a"), 5.0),
            (ProcessKey::new(20, "b"), 5.0),
        ],
        60,
    );

    let order: Vec<String> = tracker
        .top_k(3, 60)
        .into_iter()
        .map(|e| e.key.pid().to_string())
        .collect();
    assert_eq!(order, vec!["10", "20", "30"]);
}

#[test]
fn test_save_then_load_round_trips() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("mem_process.data");
    let cfg = config(3600, 15);

    let mut tracker = SlidingTopTracker::new(&cfg, 1000);
    tracker.insert(
        [
            (ProcessKey::new(7, "postgres -D /data"), 12.5),
            (ProcessKey::new(8, "redis-server *:6379"), 3.25),
        ],
        1020,
    );
    tracker.insert([(ProcessKey::new(7, "postgres -D /data"), 13.0)], 1080);
    tracker.save(&path, 1080).unwrap();

    let restored = SlidingTopTracker::load(&path, &cfg, 99_999);
    assert_eq!(restored.state(), tracker.state());
    assert_eq!(restored.window_start(), 1000);
}

#[test]
fn test_save_trims_before_writing() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cpu_process.data");
    let cfg = config(100, 15);

    let mut tracker = SlidingTopTracker::new(&cfg, 0);
    tracker.insert([(ProcessKey::new(1, "old"), 1.0)], 0);
    tracker.insert([(ProcessKey::new(2, "new"), 1.0)], 450);
    tracker.save(&path, 500).unwrap();

    let on_disk: TrackerState =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.window_start, 400);
    assert_eq!(on_disk.series.len(), 1);
    assert!(on_disk.series.contains_key(&ProcessKey::new(2, "new")));
}

#[test]
fn test_snapshot_file_layout() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("mem_process.data");

    let mut tracker = SlidingTopTracker::new(&config(3600, 15), 60);
    tracker.insert([(ProcessKey::new(42, "worker"), 10.0)], 60);
    tracker.save(&path, 60).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let obj = json.as_object().unwrap();
    assert_eq!(obj.len(), 2);
    assert_eq!(json["start_time"], 60);
    assert_eq!(json["graph"]["42\u{0}worker"], serde_json::json!([[60, 10.0]]));
}

#[test]
fn test_load_robustness() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cfg = config(3600, 15);

    let missing = SlidingTopTracker::load(&dir.path().join("absent.data"), &cfg, 777);
    assert!(missing.is_empty());
    assert_eq!(missing.window_start(), 777);

    let path = dir.path().join("broken.data");
    for content in ["not json", "", "[]", r#"{"graph": {}}"#, r#"{"start_time": 5}"#] {
        fs::write(&path, content).expect("Failed to write snapshot");
        let tracker = SlidingTopTracker::load(&path, &cfg, 777);
        assert!(tracker.is_empty(), "content {:?}", content);
        assert_eq!(tracker.window_start(), 777, "content {:?}", content);
    }
}

#[test]
fn test_snapshot_from_older_agent_is_accepted() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("mem_process.data");
    fs::write(
        &path,
        r#"{"graph": {"812\u0000/usr/sbin/sshd -D": [[1700000040, 0.5], [1700000100, 1]]}, "start_time": 1699990000}"#,
    )
    .expect("Failed to write snapshot");

    let tracker = SlidingTopTracker::load(&path, &config(43200, 15), 0);
    let key = ProcessKey::new(812, "/usr/sbin/sshd -D");
    assert_eq!(
        tracker.series(&key),
        Some(&[SeriesPoint(1700000040, 0.5), SeriesPoint(1700000100, 1.0)][..])
    );
    assert_eq!(tracker.window_start(), 1699990000);
}

#[test]
fn test_non_finite_values_survive_a_restart() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cpu_process.data");
    let cfg = config(3600, 15);

    let mut tracker = SlidingTopTracker::new(&cfg, 0);
    tracker.insert(
        [
            (ProcessKey::new(1, "spin"), f64::NAN),
            (ProcessKey::new(2, "burst"), f64::INFINITY),
            (ProcessKey::new(3, "idle"), 1.5),
        ],
        60,
    );
    tracker.insert([(ProcessKey::new(1, "spin"), 4.0)], 120);
    tracker.save(&path, 120).unwrap();

    let restored = SlidingTopTracker::load(&path, &cfg, 99_999);
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.window_start(), 0);
    assert_eq!(
        restored.series(&ProcessKey::new(1, "spin")),
        Some(&[SeriesPoint(60, 0.0), SeriesPoint(120, 4.0)][..])
    );
    assert_eq!(
        restored.series(&ProcessKey::new(2, "burst")),
        Some(&[SeriesPoint(60, 0.0)][..])
    );
}
