//! Tree command implementation.
//!
//! Samples once and shows which processes a cycle would report.

use std::time::Instant;

use cloudstats_agent::config::Config;
use cloudstats_agent::Agent;

/// Samples the process table and prints the flattened result.
pub fn command_tree(verbose: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🌳 Cloudstats Agent - Process Tree");
    println!("==================================");

    let agent = Agent::new(config.clone())?;

    let start = Instant::now();
    let (sampled, tree, flat) = agent.sample_flattened()?;
    let duration = start.elapsed();

    println!("\n📁 Sampler: {}", agent.sampler_name());
    println!(
        "   ⏱️  Sample + aggregate duration: {:.2}ms",
        duration.as_secs_f64() * 1000.0
    );
    println!("   📊 Sampled: {} processes", sampled);
    println!("   🌲 Tree nodes below pid 1: {}", tree.len());
    println!("   📋 Reported: {} processes", flat.len());

    if verbose {
        println!("\n🌲 Aggregated tree:");
        for line in tree.render().lines() {
            println!("   {}", line);
        }
    }

    println!("\n📋 Reported processes:");
    let mut sorted = flat;
    sorted.sort_by(|a, b| b.rss_kb.cmp(&a.rss_kb));
    for rec in &sorted {
        println!(
            "   ├─ {:>7} {:>10} KB {:>6.1}% cpu {:>6.1}% mem  {}",
            rec.pid, rec.rss_kb, rec.cpu_percent, rec.mem_percent, rec.command
        );
    }

    let total_rss: u64 = sorted.iter().map(|r| r.rss_kb).sum();
    println!("\n📈 Total reported RSS: {} MB", total_rss / 1024);
    println!("\n✅ Tree completed successfully");
    Ok(())
}
