//! CLI side of the local API. One-shot commands that touch delivery state go
//! through the running service so its notification log sees every record.

use crate::poller::CycleReport;
use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub async fn request_cycle(api_base_url: &str) -> Result<CycleReport> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .build()
        .context("Failed to create API HTTP client")?;

    let endpoint = format!("{}/api/v1/reminders/poll", api_base_url.trim_end_matches('/'));
    let response = match client.post(&endpoint).send().await {
        Ok(response) => response,
        Err(error) if error.is_connect() => bail!(
            "taskpulse service is not running at {api_base_url}. Start it with `taskpulse service`."
        ),
        Err(error) => return Err(error).context("Reminder poll request failed"),
    };

    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read poll response body")?;

    if status == StatusCode::CONFLICT {
        bail!("A reminder cycle is already running");
    }

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        bail!("Reminder poll failed {status}: {message}");
    }

    serde_json::from_str(&body).with_context(|| format!("Failed to parse poll response: {body}"))
}
