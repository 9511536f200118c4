use std::net::IpAddr;

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::Serialize;

use crate::config::CloudflareConfig;
use super::DnsUpdateResult;

const RECORD_COMMENT: &str = "updated by cloudflare-ddns-relay";
const RECORD_TTL: u32 = 300;
const RECORD_TYPE: &str = "A";

/// Points the configured DNS record at `ip` with a single PUT.
///
/// Any non-2xx answer is an error carrying the status code and the body
/// Cloudflare sent back. Successful response bodies are not inspected.
pub async fn update_record(
    client: &Client,
    config: &CloudflareConfig,
    ip: IpAddr,
) -> Result<DnsUpdateResult> {
    let content = ip.to_canonical().to_string();

    let body = serde_json::to_string(&UpdateRecordRequest {
        comment: RECORD_COMMENT,
        content: &content,
        name: &config.dns_name,
        proxied: false,
        ttl: RECORD_TTL,
        record_type: RECORD_TYPE,
    })
    .context("Failed to serialize DNS record")?;

    let url = config.record_url();
    debug!("PUT {} content={}", url, content);

    let response = client
        .put(&url)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .header("X-Auth-Email", &config.email)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .context("Failed to send update request to Cloudflare")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Cloudflare API error: {} - {}", status.as_u16(), text);
    }

    Ok(DnsUpdateResult {
        name: config.dns_name.clone(),
        content,
        status: status.as_u16(),
    })
}

// Cloudflare API types

#[derive(Debug, Serialize)]
struct UpdateRecordRequest<'a> {
    comment: &'a str,
    content: &'a str,
    name: &'a str,
    proxied: bool,
    ttl: u32,
    #[serde(rename = "type")]
    record_type: &'a str,
}
