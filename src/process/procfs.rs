//! Process sampling straight from the /proc filesystem (Linux).
//!
//! Produces the same columns `ps axo pid,ppid,rss,pcpu,pmem,vsize,command`
//! would, without spawning a child process each cycle.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::process::record::ProcessRecord;
use crate::process::sampler::{ProcessSampler, SampleError};

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

fn get_page_size_kb() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64 / 1024;
            }
        }
    }
    4
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

static PAGE_SIZE_KB: Lazy<u64> = Lazy::new(get_page_size_kb);

/// Fields of /proc/<pid>/stat the sampler needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatFields {
    pub ppid: u32,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_ticks: u64,
    pub vsize_bytes: u64,
    pub rss_pages: u64,
}

/// Parses /proc/<pid>/stat content.
///
/// The comm field may contain spaces and parentheses, so parsing resumes after
/// the last ')'.
pub fn parse_stat(content: &str) -> Option<(String, StatFields)> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let comm = content.get(open + 1..close)?.to_string();
    let parts: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
    // parts[0] is the state field (field 3 of the stat line)
    if parts.len() <= 21 {
        return None;
    }
    let num = |i: usize| parts[i].parse::<u64>().unwrap_or(0);

    Some((
        comm,
        StatFields {
            ppid: parts[1].parse().unwrap_or(0),
            utime_ticks: num(11),
            stime_ticks: num(12),
            start_ticks: num(19),
            vsize_bytes: num(20),
            rss_pages: num(21),
        },
    ))
}

/// Reads the command line, falling back to `[comm]` for kernel threads.
fn read_command(proc_path: &Path, comm: &str) -> String {
    match fs::read(proc_path.join("cmdline")) {
        Ok(content) if !content.is_empty() => content
            .split(|&b| b == 0u8)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        _ => format!("[{}]", comm),
    }
}

/// Reads MemTotal from /proc/meminfo in KB.
pub fn read_mem_total_kb(root: &Path) -> Option<u64> {
    let content = fs::read_to_string(root.join("meminfo")).ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Reads system uptime in seconds from /proc/uptime.
pub fn read_uptime(root: &Path) -> Option<f64> {
    let content = fs::read_to_string(root.join("uptime")).ok()?;
    content.split_whitespace().next()?.parse().ok()
}

/// Samples every numeric directory below a proc root.
#[derive(Debug)]
pub struct ProcfsSampler {
    root: PathBuf,
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsSampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_process(
        &self,
        pid: u32,
        proc_path: &Path,
        uptime: f64,
        mem_total_kb: u64,
    ) -> Option<ProcessRecord> {
        let content = match fs::read_to_string(proc_path.join("stat")) {
            Ok(c) => c,
            Err(e) => {
                // Processes routinely exit between readdir and read.
                debug!("Skipping pid {}: {}", pid, e);
                return None;
            }
        };
        let (comm, stat) = parse_stat(&content)?;

        let rss_kb = stat.rss_pages * *PAGE_SIZE_KB;
        let cpu_seconds = (stat.utime_ticks + stat.stime_ticks) as f64 / *CLK_TCK;
        let elapsed = uptime - stat.start_ticks as f64 / *CLK_TCK;
        let cpu_percent = if elapsed > 0.0 {
            cpu_seconds / elapsed * 100.0
        } else {
            0.0
        };
        let mem_percent = if mem_total_kb > 0 {
            rss_kb as f64 / mem_total_kb as f64 * 100.0
        } else {
            0.0
        };

        Some(ProcessRecord::new(
            pid,
            stat.ppid,
            rss_kb,
            cpu_percent,
            mem_percent,
            stat.vsize_bytes / 1024,
            &read_command(proc_path, &comm),
        ))
    }
}

impl ProcessSampler for ProcfsSampler {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn sample(&self) -> Result<Vec<ProcessRecord>, SampleError> {
        let entries = fs::read_dir(&self.root).map_err(|source| SampleError::Io {
            path: self.root.clone(),
            source,
        })?;

        let pids: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let pid = path.file_name()?.to_str()?.parse::<u32>().ok()?;
                Some((pid, path))
            })
            .collect();

        let uptime = read_uptime(&self.root).unwrap_or(0.0);
        let mem_total_kb = read_mem_total_kb(&self.root).unwrap_or(0);

        let mut records: Vec<ProcessRecord> = pids
            .par_iter()
            .filter_map(|(pid, path)| self.read_process(*pid, path, uptime, mem_total_kb))
            .collect();
        records.sort_by_key(|r| r.pid);

        debug!("Sampled {} processes from {}", records.len(), self.root.display());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // pid (comm) state ppid pgrp session tty_nr tpgid flags minflt cminflt majflt cmajflt
    // utime stime cutime cstime priority nice num_threads itrealvalue starttime vsize rss ...
    fn stat_line(pid: u32, comm: &str, ppid: u32, utime: u64, stime: u64, start: u64, rss_pages: u64) -> String {
        format!(
            "{} ({}) S {} {} {} 0 -1 4194304 100 0 0 0 {} {} 0 0 20 0 1 0 {} 104857600 {} 18446744073709551615",
            pid, comm, ppid, pid, pid, utime, stime, start, rss_pages
        )
    }

    fn fake_proc(root: &Path, pid: u32, stat: &str, cmdline: &[u8]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).expect("Failed to create pid dir");
        fs::write(dir.join("stat"), stat).expect("Failed to write stat");
        fs::write(dir.join("cmdline"), cmdline).expect("Failed to write cmdline");
    }

    #[test]
    fn test_parse_stat_with_spaces_in_comm() {
        let line = stat_line(42, "Web Content (1)", 7, 10, 5, 300, 25);
        let (comm, stat) = parse_stat(&line).unwrap();
        assert_eq!(comm, "Web Content (1)");
        assert_eq!(stat.ppid, 7);
        assert_eq!(stat.utime_ticks, 10);
        assert_eq!(stat.stime_ticks, 5);
        assert_eq!(stat.start_ticks, 300);
        assert_eq!(stat.vsize_bytes, 104857600);
        assert_eq!(stat.rss_pages, 25);
    }

    #[test]
    fn test_parse_stat_invalid() {
        assert!(parse_stat("1234 (test) S 1 2 3").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn test_procfs_sampler_reads_fake_root() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        fs::write(root.join("meminfo"), "MemTotal:        1000000 kB\nMemFree: 1 kB\n")
            .expect("Failed to write meminfo");
        fs::write(root.join("uptime"), "1000.00 4000.00\n").expect("Failed to write uptime");

        let tck = *CLK_TCK as u64;
        // Started at uptime 500s, used 50s of CPU -> 10%
        fake_proc(
            root,
            100,
            &stat_line(100, "nginx", 1, 40 * tck, 10 * tck, 500 * tck, 1000),
            b"nginx: master process\0-g\0daemon off;\0",
        );
        fake_proc(root, 101, &stat_line(101, "kworker/0:1", 2, 0, 0, 0, 0), b"");
        fs::create_dir_all(root.join("self")).expect("Failed to create self dir");

        let records = ProcfsSampler::new(root).sample().unwrap();
        assert_eq!(records.len(), 2);

        let nginx = &records[0];
        assert_eq!(nginx.pid, 100);
        assert_eq!(nginx.ppid, 1);
        assert_eq!(nginx.command, "nginx: master process -g daemon off;");
        assert_eq!(nginx.rss_kb, 1000 * *PAGE_SIZE_KB);
        assert_eq!(nginx.vsz_kb, 102400);
        assert!((nginx.cpu_percent - 10.0).abs() < 0.01);
        let expected_mem = nginx.rss_kb as f64 / 1_000_000.0 * 100.0;
        assert!((nginx.mem_percent - expected_mem).abs() < 1e-9);

        assert_eq!(records[1].command, "[kworker/0:1]");
        assert!(records[1].is_kernel_helper());
    }

    #[test]
    fn test_procfs_sampler_missing_root() {
        let err = ProcfsSampler::new("/nonexistent/proc").sample().unwrap_err();
        assert!(matches!(err, SampleError::Io { .. }));
    }
}
