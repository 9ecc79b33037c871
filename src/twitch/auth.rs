// ABOUTME: Twitch OAuth device-code flow for acquiring chat credentials.
// ABOUTME: One grant per process start; tokens are held in memory and never refreshed.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::time::Instant;

/// Scopes needed to read and post chat messages.
pub const CHAT_SCOPES: &str = "chat:read chat:edit";

fn default_interval() -> u64 {
    5
}

/// Server response to a device code request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Access credentials from a completed grant.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// Tokens must never reach logs, so Debug redacts both fields.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***REDACTED***")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenPollResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    // Twitch puts the failure reason here on 400 responses.
    message: Option<String>,
}

impl TokenPollResponse {
    fn failure_reason(self) -> Option<String> {
        self.error.or(self.message)
    }
}

/// Ask the authorization server for a device code the user can redeem in a
/// browser.
pub async fn request_device_code(
    client: &reqwest::Client,
    device_url: &str,
    client_id: &str,
) -> Result<DeviceCodeResponse> {
    let response = client
        .post(device_url)
        .form(&[("client_id", client_id), ("scopes", CHAT_SCOPES)])
        .send()
        .await
        .context("device code request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("device code request failed with {status}: {body}");
    }

    response
        .json()
        .await
        .context("invalid device code response")
}

/// Poll the token endpoint until the user approves the device, the code
/// expires, or the server reports a terminal error.
pub async fn poll_for_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    device: &DeviceCodeResponse,
) -> Result<TokenPair> {
    let interval = Duration::from_secs(device.interval.max(1));
    let deadline = device
        .expires_in
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        tokio::time::sleep(interval).await;

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                bail!("device code expired before the grant was approved");
            }
        }

        let response = client
            .post(token_url)
            .form(&[
                ("client_id", client_id),
                ("scopes", CHAT_SCOPES),
                ("device_code", device.device_code.as_str()),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ])
            .send()
            .await
            .context("token poll request failed")?;

        let poll: TokenPollResponse = response
            .json()
            .await
            .context("invalid token endpoint response")?;

        if let Some(access_token) = poll.access_token {
            return Ok(TokenPair {
                access_token,
                refresh_token: poll.refresh_token,
            });
        }

        match poll.failure_reason().as_deref() {
            Some("authorization_pending") => continue,
            Some("slow_down") => {
                // Server asked for more headroom on top of the base interval.
                tokio::time::sleep(interval).await;
            }
            Some(reason) => bail!("device flow error: {reason}"),
            None => bail!("unexpected response from token endpoint"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
