//! Upstream report delivery.
//!
//! One POST per cycle. Delivery problems are logged and swallowed so that a
//! flaky collector never stops the sampling loop.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

use crate::report::CycleReport;

/// HTTP client for the report endpoint.
#[derive(Clone)]
pub struct HttpReportClient {
    url: String,
    client: reqwest::Client,
}

impl HttpReportClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cloudstats-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts the report as JSON. Returns whether the collector accepted it.
    pub async fn send(&self, report: &CycleReport) -> bool {
        let resp = match self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(report)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!("Report to {} timed out: {}", self.url, e);
                return false;
            }
            Err(e) if e.is_connect() => {
                warn!("Cannot connect to {}: {}", self.url, e);
                return false;
            }
            Err(e) => {
                warn!("Failed to send report to {}: {}", self.url, e);
                return false;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("Collector {} rejected report with status {}", self.url, status);
            return false;
        }
        debug!(
            "Delivered report ({} processes) to {}",
            report.count, self.url
        );
        true
    }
}
