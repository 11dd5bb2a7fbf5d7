//! Process snapshot acquisition.
//!
//! Each platform gets its own `ProcessSampler`; `select_sampler` picks one at
//! startup and the agent never branches on the platform again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::config::{Config, DEFAULT_SAMPLER};
use crate::process::record::{ProcessRecord, RawProcess};

/// Column list requested from `ps`; `command` must stay last.
pub const PS_COLUMNS: &str = "pid,ppid,rss,pcpu,pmem,vsize,command";

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of flat process snapshots.
pub trait ProcessSampler: Send + Sync {
    fn name(&self) -> &'static str;
    fn sample(&self) -> Result<Vec<ProcessRecord>, SampleError>;
}

/// Samples by running `ps axo pid,ppid,rss,pcpu,pmem,vsize,command`.
#[derive(Debug, Default)]
pub struct PsSampler;

impl ProcessSampler for PsSampler {
    fn name(&self) -> &'static str {
        "ps"
    }

    fn sample(&self) -> Result<Vec<ProcessRecord>, SampleError> {
        let output = Command::new("ps")
            .args(["axo", PS_COLUMNS])
            .output()
            .map_err(|source| SampleError::Spawn {
                program: "ps",
                source,
            })?;
        if !output.status.success() {
            return Err(SampleError::Exit {
                program: "ps",
                status: output.status,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ps_output(&text)
            .iter()
            .filter_map(RawProcess::to_record)
            .collect())
    }
}

/// Splits `ps` output into raw rows, skipping the header line.
///
/// The first six columns are whitespace separated; everything after them is the
/// command line, kept verbatim apart from surrounding whitespace.
pub fn parse_ps_output(text: &str) -> Vec<RawProcess> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut rest = line.trim_start();
            let mut fields: [&str; 6] = [""; 6];
            for field in fields.iter_mut() {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                *field = &rest[..end];
                rest = rest[end..].trim_start();
            }
            if fields[0].is_empty() {
                return None;
            }
            Some(RawProcess {
                pid: fields[0].to_string(),
                ppid: fields[1].to_string(),
                rss: fields[2].to_string(),
                cpu: fields[3].to_string(),
                mem: fields[4].to_string(),
                vsz: fields[5].to_string(),
                command: rest.trim_end().to_string(),
            })
        })
        .collect()
}

/// Snapshot file read by `FileSampler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated_at: String,
    pub processes: Vec<RawProcess>,
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> Result<TestData, SampleError> {
    debug!("Loading test data from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SampleError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Replays a synthetic snapshot from a JSON file on every call.
#[derive(Debug)]
pub struct FileSampler {
    path: PathBuf,
}

impl FileSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProcessSampler for FileSampler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn sample(&self) -> Result<Vec<ProcessRecord>, SampleError> {
        let data = load_test_data_from_file(&self.path)?;
        Ok(data
            .processes
            .iter()
            .filter_map(RawProcess::to_record)
            .collect())
    }
}

/// Picks the sampler for this host once at startup.
pub fn select_sampler(cfg: &Config) -> Box<dyn ProcessSampler> {
    if let Some(path) = &cfg.test_data_file {
        info!("Using test data from file: {}", path.display());
        return Box::new(FileSampler::new(path.clone()));
    }

    let sampler: Box<dyn ProcessSampler> = match cfg.sampler.as_deref().unwrap_or(DEFAULT_SAMPLER) {
        "ps" => Box::new(PsSampler),
        #[cfg(target_os = "linux")]
        _ => Box::new(crate::process::procfs::ProcfsSampler::default()),
        #[cfg(not(target_os = "linux"))]
        _ => Box::new(PsSampler),
    };
    info!("Using {} process sampler", sampler.name());
    sampler
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PS_SAMPLE: &str = "  PID  PPID   RSS %CPU %MEM    VSZ COMMAND
    1     0 11800  0.0  0.1 167744 /sbin/init splash
    2     0     0  0.0  0.0      0 [kthreadd]
  812     1  5520  0.0  0.0  15420 /usr/sbin/sshd -D
 1201   812  7000  1.5  0.1  17000 sshd: alice [priv]
 1300  1201  5000 12.5  2.5 220000 -bash
";

    #[test]
    fn test_parse_ps_output() {
        let rows = parse_ps_output(PS_SAMPLE);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].pid, "1");
        assert_eq!(rows[0].command, "/sbin/init splash");
        assert_eq!(rows[3].command, "sshd: alice [priv]");
        assert_eq!(rows[4].cpu, "12.5");
        assert_eq!(rows[4].vsz, "220000");
    }

    #[test]
    fn test_parse_ps_output_short_rows() {
        let rows = parse_ps_output("PID PPID\n  77\n\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pid, "77");
        assert_eq!(rows[0].command, "");

        let rec = rows[0].to_record().unwrap();
        assert_eq!(rec.rss_kb, 0);
    }

    #[test]
    fn test_file_sampler_reads_snapshot() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"processes": [
                {"pid": "10", "ppid": "1", "rss": "100", "cpu": "1.0", "mem": "0.5", "vsz": "900", "command": "nginx"},
                {"pid": 11, "ppid": 10, "rss": 50, "cpu": 0.5, "mem": 0.2, "vsz": 400, "command": "nginx: worker"},
                {"pid": "bogus", "command": "dropped"}
            ]}"#,
        )
        .expect("Failed to write snapshot");

        let records = FileSampler::new(&path).sample().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].ppid, 10);
    }

    #[test]
    fn test_file_sampler_missing_file_is_error() {
        let err = FileSampler::new("/nonexistent/snapshot.json")
            .sample()
            .unwrap_err();
        assert!(matches!(err, SampleError::Io { .. }));
    }

    #[test]
    fn test_select_sampler_prefers_test_data() {
        let mut cfg = Config::default();
        cfg.test_data_file = Some(PathBuf::from("/tmp/x.json"));
        assert_eq!(select_sampler(&cfg).name(), "file");

        let mut cfg = Config::default();
        cfg.sampler = Some("ps".into());
        assert_eq!(select_sampler(&cfg).name(), "ps");
    }
}
