//! Webhook notification at the end of a run.
//!
//! Notification is strictly best effort. A run whose rows all succeeded
//! must not fail because the webhook was down; failures are logged and
//! swallowed by the caller.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::Summary;

/// JSON payload posted when a run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_label: String,
    pub command: String,
    pub started_at: String,
    pub finished_at: String,
    pub dry_run: bool,
    pub summary: Summary,
    pub log_csv: String,
}

/// Something that can receive a finished-run report.
pub trait Notifier {
    fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Posts the report as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build webhook client")?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, report: &RunReport) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .with_context(|| format!("post run report to {}", self.url))?;
        if !response.status().is_success() {
            anyhow::bail!("webhook {} answered {}", self.url, response.status());
        }
        Ok(())
    }
}
