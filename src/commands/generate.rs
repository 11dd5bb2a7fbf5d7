//! Generate testdata command implementation.
//!
//! Writes a synthetic process snapshot that `test_data_file` can replay: a
//! random tree under pid 1 made of login sessions, multiplexers, services and
//! standalone workers, plus a few kernel threads.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use cloudstats_agent::process::{RawProcess, TestData, KERNEL_HELPER_PID, ROOT_PID};

const FIRST_PID: u32 = 300;
const KERNEL_THREADS: u32 = 4;

const WORKLOADS: &[&str] = &[
    "python3 /opt/app/worker.py --queue default",
    "java -Xmx2g -jar /srv/billing/billing.jar",
    "node /srv/web/server.js",
    "/usr/bin/redis-server 127.0.0.1:6379",
    "ruby bin/rails server -p 3000",
    "/usr/local/bin/backup --full",
    "make -j8",
    "vim notes.txt",
];

const SERVICES: &[(&str, &str)] = &[
    ("nginx: master process /usr/sbin/nginx", "nginx: worker process"),
    ("/usr/lib/postgresql/15/bin/postgres -D /var/lib/postgresql", "postgres: checkpointer"),
    ("/usr/sbin/apache2 -k start", "/usr/sbin/apache2 -k start"),
];

struct Builder<'a, R: Rng> {
    rng: &'a mut R,
    next_pid: u32,
    out: Vec<RawProcess>,
}

impl<R: Rng> Builder<'_, R> {
    fn push(&mut self, ppid: u32, command: &str, heavy: bool) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;

        // Supervisors are light, workloads carry the weight.
        let (rss, cpu) = if heavy {
            (
                self.rng.gen_range(20_000..2_000_000u64),
                self.rng.gen_range(0.0..80.0f64),
            )
        } else {
            (
                self.rng.gen_range(1_000..12_000u64),
                self.rng.gen_range(0.0..0.5f64),
            )
        };
        let mem = rss as f64 / 16_000_000.0 * 100.0;
        let vsz = rss * self.rng.gen_range(2..6u64);

        self.out.push(RawProcess {
            pid: pid.to_string(),
            ppid: ppid.to_string(),
            rss: rss.to_string(),
            cpu: format!("{:.1}", cpu),
            mem: format!("{:.1}", mem),
            vsz: vsz.to_string(),
            command: command.to_string(),
        });
        pid
    }

    fn workload(&mut self) -> &'static str {
        WORKLOADS.choose(&mut *self.rng).copied().unwrap_or("sleep 3600")
    }

    fn below_root(&self) -> usize {
        self.out.len() - 2 - KERNEL_THREADS as usize
    }
}

/// Generates a random process table with `count` processes below pid 1.
pub fn generate_processes(rng: &mut impl Rng, count: usize) -> Vec<RawProcess> {
    let mut b = Builder {
        rng,
        next_pid: FIRST_PID,
        out: Vec::with_capacity(count + KERNEL_THREADS as usize + 2),
    };

    b.out.push(RawProcess {
        pid: ROOT_PID.to_string(),
        ppid: "0".into(),
        rss: "11800".into(),
        cpu: "0.0".into(),
        mem: "0.1".into(),
        vsz: "167744".into(),
        command: "/sbin/init splash".into(),
    });
    b.out.push(RawProcess {
        pid: KERNEL_HELPER_PID.to_string(),
        ppid: "0".into(),
        command: "[kthreadd]".into(),
        ..RawProcess::default()
    });
    for i in 0..KERNEL_THREADS {
        b.out.push(RawProcess {
            pid: (KERNEL_HELPER_PID + 1 + i).to_string(),
            ppid: KERNEL_HELPER_PID.to_string(),
            command: format!("[kworker/{}:0]", i),
            ..RawProcess::default()
        });
    }

    while b.below_root() < count {
        let remaining = count - b.below_root();
        match b.rng.gen_range(0..4) {
            // sshd session -> login shell -> workload
            0 if remaining >= 3 => {
                let sshd = b.push(ROOT_PID, "sshd: alice [priv]", false);
                let shell = b.push(sshd, "-bash", false);
                let cmd = b.workload();
                b.push(shell, cmd, true);
            }
            // tmux server -> shell -> workload
            1 if remaining >= 3 => {
                let tmux = b.push(ROOT_PID, "tmux new-session -d", false);
                let shell = b.push(tmux, "bash", false);
                let cmd = b.workload();
                b.push(shell, cmd, true);
            }
            // service master with workers
            2 if remaining >= 2 => {
                let (master, worker) = *SERVICES.choose(&mut *b.rng).unwrap_or(&SERVICES[0]);
                let parent = b.push(ROOT_PID, master, true);
                let workers = b.rng.gen_range(1..=remaining.min(4) - 1);
                for _ in 0..workers {
                    b.push(parent, worker, true);
                }
            }
            _ => {
                let cmd = b.workload();
                b.push(ROOT_PID, cmd, true);
            }
        }
    }

    b.out
}

/// Generates synthetic test data JSON file for testing purposes.
pub fn command_generate_testdata(
    output: PathBuf,
    processes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(
        "Generating test data: processes={}, output={}",
        processes,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let test_data = TestData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        processes: generate_processes(&mut rng, processes),
    };

    // Write to file as pretty-printed JSON
    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated test data: {} processes in {}",
        test_data.processes.len(),
        output.display()
    );

    Ok(())
}
