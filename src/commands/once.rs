//! Once command implementation.
//!
//! Runs a single full cycle and prints the report that would be sent.

use std::time::Duration;
use tracing::debug;

use cloudstats_agent::config::{Config, DEFAULT_REPORT_TIMEOUT_SECONDS};
use cloudstats_agent::{Agent, HttpReportClient};

/// Pause between the network baseline and the cycle.
const NETWORK_BASELINE: Duration = Duration::from_secs(1);

/// Runs one cycle, prints the report JSON and optionally posts it.
pub async fn command_once(send: bool, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = config
        .report_timeout_seconds
        .unwrap_or(DEFAULT_REPORT_TIMEOUT_SECONDS);
    let report_url = config.report_url.clone();

    let mut agent = Agent::new(config)?;
    if agent.prime_network() {
        debug!("Measuring network speeds over {:?}", NETWORK_BASELINE);
        tokio::time::sleep(NETWORK_BASELINE).await;
    }
    let report = agent.run_cycle()?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if send {
        match report_url {
            Some(url) => {
                let client = HttpReportClient::new(&url, Duration::from_secs(timeout))?;
                if client.send(&report).await {
                    eprintln!("✅ Report delivered to {}", url);
                } else {
                    eprintln!("❌ Report could not be delivered to {}", url);
                }
            }
            None => eprintln!("⚠️  --send given but no report_url configured"),
        }
    }

    Ok(())
}
