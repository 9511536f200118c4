use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub mod cloudflare;

#[derive(Debug)]
pub struct DnsUpdateResult {
    pub name: String,
    pub content: String,
    pub status: u16,
}

/// Builds the client shared by every request; one provider call may not
/// outlive `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
