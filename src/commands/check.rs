//! Check command implementation.
//!
//! Validates configuration, the state directory, one sampler round and the
//! network counter source.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;

use chrono::Utc;

use cloudstats_agent::config::{validate_effective_config, Config};
use cloudstats_agent::NetworkSampler;
use cloudstats_agent::process::{select_sampler, ProcessRules};
use cloudstats_agent::snapshot::read_state;

/// Validates system requirements and configuration.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Cloudstats Agent - System Check");
    println!("==================================");

    let mut all_ok = true;

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    // Check privileges
    println!("\n👤 Checking privileges...");
    if geteuid().is_root() {
        println!("   ✅ Running as root - all processes visible");
    } else {
        println!("   ⚠️  Not running as root - some command lines may be hidden");
    }

    // Check state directory
    let state_dir = config.state_dir();
    println!("\n💾 Checking state directory {}...", state_dir.display());
    match check_writable(&state_dir) {
        Ok(()) => println!("   ✅ State directory is writable"),
        Err(e) => {
            println!("   ❌ Cannot write to state directory: {}", e);
            all_ok = false;
        }
    }
    for path in [config.mem_snapshot_path(), config.cpu_snapshot_path()] {
        if !path.exists() {
            println!("   ℹ️  {} not present yet", path.display());
        } else if let Some(state) = read_state(&path) {
            println!(
                "   ✅ {} holds {} tracked processes",
                path.display(),
                state.series.len()
            );
        } else {
            println!(
                "   ⚠️  {} is unreadable and will be replaced",
                path.display()
            );
        }
    }

    // Check sampler
    println!("\n📁 Checking process sampler...");
    match ProcessRules::from_config(&config.rules) {
        Ok(_) => println!("   ✅ Collapse rules compile"),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }
    let sampler = select_sampler(config);
    match sampler.sample() {
        Ok(records) if records.is_empty() => {
            println!("   ❌ Sampler '{}' returned no processes", sampler.name());
            all_ok = false;
        }
        Ok(records) => {
            println!(
                "   ✅ Sampler '{}' read {} processes",
                sampler.name(),
                records.len()
            );
        }
        Err(e) => {
            println!("   ❌ Sampler '{}' failed: {}", sampler.name(), e);
            all_ok = false;
        }
    }

    // Check network counters
    println!("\n🌐 Checking network counters...");
    match NetworkSampler::from_config(&config.network) {
        Some(mut network) => match network.sample_at(Utc::now()) {
            Ok(usage) => println!(
                "   ✅ {} lists {} interfaces",
                network.path().display(),
                usage.all.len()
            ),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        },
        None => println!("   ℹ️  Network collection disabled"),
    }

    // Check collector
    println!("\n📡 Checking report target...");
    match &config.report_url {
        Some(url) => println!("   ✅ Reports go to {}", url),
        None => println!("   ⚠️  No report_url configured - reports are only logged"),
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - agent is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}

/// Creates the directory if needed and writes a scratch file into it.
fn check_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let scratch = dir.join(".cloudstats-write-test");
    fs::write(&scratch, b"ok")?;
    fs::remove_file(&scratch)
}
