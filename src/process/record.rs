//! Process records produced by sampling.
//!
//! `RawProcess` is the text-only form handed over by the samplers; it is coerced
//! into a numeric `ProcessRecord` without ever failing the whole snapshot.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Process ID whose children form the roots of the process tree.
pub const ROOT_PID: u32 = 1;

/// Kernel thread helper (kthreadd); it and its children are never reported.
pub const KERNEL_HELPER_PID: u32 = 2;

/// One process as observed in a single snapshot.
///
/// After tree building, `rss_kb`, `cpu_percent` and `mem_percent` hold the
/// process's own usage plus the usage of its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    #[serde(rename = "rss")]
    pub rss_kb: u64,
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "mem")]
    pub mem_percent: f64,
    #[serde(rename = "vsz")]
    pub vsz_kb: u64,
    pub command: String,
    #[serde(rename = "exec")]
    pub executable: String,
}

impl ProcessRecord {
    /// Creates a record, deriving the executable name from `command`.
    pub fn new(
        pid: u32,
        ppid: u32,
        rss_kb: u64,
        cpu_percent: f64,
        mem_percent: f64,
        vsz_kb: u64,
        command: &str,
    ) -> Self {
        let command = sanitize_command(command);
        let executable = executable_name(&command);
        Self {
            pid,
            ppid,
            rss_kb,
            cpu_percent: finite_or_zero(cpu_percent),
            mem_percent: finite_or_zero(mem_percent),
            vsz_kb,
            command,
            executable,
        }
    }

    /// True for kthreadd and the kernel threads it spawns.
    pub fn is_kernel_helper(&self) -> bool {
        self.pid == KERNEL_HELPER_PID || self.ppid == KERNEL_HELPER_PID
    }
}

/// Lowercased basename of the first whitespace-separated token of a command.
pub fn executable_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or("");
    Path::new(first)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(first)
        .to_lowercase()
}

/// Replaces NUL bytes so a command can never contain the process-key separator.
fn sanitize_command(command: &str) -> String {
    if command.contains('\0') {
        command.replace('\0', " ")
    } else {
        command.to_string()
    }
}

pub(crate) fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Process row as text fields, straight from a sampler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProcess {
    #[serde(deserialize_with = "lenient_text")]
    pub pid: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub ppid: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub rss: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cpu: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub mem: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vsz: String,
    #[serde(default)]
    pub command: String,
}

impl RawProcess {
    /// Coerces the text fields into a record.
    ///
    /// Malformed numeric fields become zero; only an unparsable pid drops the row.
    pub fn to_record(&self) -> Option<ProcessRecord> {
        let pid = self.pid.trim().parse::<u32>().ok()?;
        Some(ProcessRecord::new(
            pid,
            coerce_u32(&self.ppid),
            coerce_u64(&self.rss),
            coerce_f64(&self.cpu),
            coerce_f64(&self.mem),
            coerce_u64(&self.vsz),
            &self.command,
        ))
    }
}

fn coerce_u32(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

fn coerce_u64(s: &str) -> u64 {
    let s = s.trim();
    // ps prints some columns as "12.0" on a few platforms
    s.parse::<u64>()
        .ok()
        .or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        })
        .unwrap_or(0)
}

fn coerce_f64(s: &str) -> f64 {
    let v = s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0);
    finite_or_zero(v)
}

/// Accepts either a JSON string or a JSON number and keeps it as text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Int(i64),
        Float(f64),
        Null(()),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::Str(s) => s,
        Text::Int(i) => i.to_string(),
        Text::Float(f) => f.to_string(),
        Text::Null(()) => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pid: &str, ppid: &str, rss: &str, cpu: &str, mem: &str, command: &str) -> RawProcess {
        RawProcess {
            pid: pid.into(),
            ppid: ppid.into(),
            rss: rss.into(),
            cpu: cpu.into(),
            mem: mem.into(),
            vsz: "1000".into(),
            command: command.into(),
        }
    }

    #[test]
    fn test_executable_name() {
        assert_eq!(executable_name("/usr/bin/Python3 script.py"), "python3");
        assert_eq!(executable_name("-bash"), "-bash");
        assert_eq!(executable_name("nginx: worker process"), "nginx:");
        assert_eq!(executable_name(""), "");
        assert_eq!(executable_name("   "), "");
    }

    #[test]
    fn test_to_record_coerces_numbers() {
        let rec = raw("42", "1", "2048", "12.5", "0.3", "/usr/sbin/nginx -g daemon")
            .to_record()
            .unwrap();
        assert_eq!(rec.pid, 42);
        assert_eq!(rec.ppid, 1);
        assert_eq!(rec.rss_kb, 2048);
        assert_eq!(rec.cpu_percent, 12.5);
        assert_eq!(rec.mem_percent, 0.3);
        assert_eq!(rec.vsz_kb, 1000);
        assert_eq!(rec.executable, "nginx");
    }

    #[test]
    fn test_to_record_malformed_fields_become_zero() {
        let rec = raw("7", "x", "lots", "NaN", "", "worker").to_record().unwrap();
        assert_eq!(rec.ppid, 0);
        assert_eq!(rec.rss_kb, 0);
        assert_eq!(rec.cpu_percent, 0.0);
        assert_eq!(rec.mem_percent, 0.0);
    }

    #[test]
    fn test_to_record_requires_pid() {
        assert!(raw("PID", "1", "1", "1", "1", "x").to_record().is_none());
        assert!(raw("", "1", "1", "1", "1", "x").to_record().is_none());
    }

    #[test]
    fn test_command_nul_bytes_are_replaced() {
        let rec = ProcessRecord::new(5, 1, 0, 0.0, 0.0, 0, "java\0-jar\0app.jar");
        assert!(!rec.command.contains('\0'));
        assert_eq!(rec.executable, "java");
    }

    #[test]
    fn test_kernel_helper_detection() {
        assert!(ProcessRecord::new(2, 0, 0, 0.0, 0.0, 0, "kthreadd").is_kernel_helper());
        assert!(ProcessRecord::new(90, 2, 0, 0.0, 0.0, 0, "kworker/0:1").is_kernel_helper());
        assert!(!ProcessRecord::new(90, 1, 0, 0.0, 0.0, 0, "sshd").is_kernel_helper());
    }

    #[test]
    fn test_raw_process_accepts_numbers_and_strings() {
        let json = r#"{"pid": 10, "ppid": "1", "rss": 512, "cpu": 1.5, "mem": "0.1", "vsz": null, "command": "redis-server"}"#;
        let raw: RawProcess = serde_json::from_str(json).unwrap();
        let rec = raw.to_record().unwrap();
        assert_eq!(rec.pid, 10);
        assert_eq!(rec.rss_kb, 512);
        assert_eq!(rec.cpu_percent, 1.5);
        assert_eq!(rec.vsz_kb, 0);
    }

    #[test]
    fn test_record_serializes_with_short_keys() {
        let rec = ProcessRecord::new(3, 1, 10, 1.0, 2.0, 20, "/bin/app");
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["rss"], 10);
        assert_eq!(value["exec"], "app");
        assert_eq!(value["vsz"], 20);
    }
}
