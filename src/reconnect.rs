// ABOUTME: Reconnection policy shared by both connector loops.
// ABOUTME: Linear capped backoff (5s, 10s, ... 30s), failure classification, cancellable waits.

use std::time::Duration;

use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

/// Backoff configuration for a connector loop.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay added per consecutive failure
    pub step: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Fixed delay after an unclassified error (does not advance the counter)
    pub unexpected_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            unexpected_delay: Duration::from_secs(5),
        }
    }
}

/// Tracks consecutive connection failures and the delay they earn.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    /// Record a successful connection (resets the counter).
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a recognized connection failure and return the delay before the
    /// next attempt: `step * failures`, capped at `max_delay`.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;
        std::cmp::min(
            self.config.step * self.consecutive_failures,
            self.config.max_delay,
        )
    }

    /// Delay applied after an unclassified error. The failure counter is left
    /// alone so the bounded schedule resumes where it was.
    pub fn unexpected_delay(&self) -> Duration {
        self.config.unexpected_delay
    }

    /// Number of consecutive recognized failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Errors that mean "the remote is unreachable" and earn the bounded backoff
/// schedule. Everything else is treated as unexpected by the loops.
pub fn is_connection_failure(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(_)
            | tungstenite::Error::Tls(_)
            | tungstenite::Error::Http(_)
            | tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
    )
}

/// Classify an error chain that may wrap a WebSocket error.
pub fn is_connection_failure_chain(err: &anyhow::Error) -> bool {
    err.downcast_ref::<tungstenite::Error>()
        .map(is_connection_failure)
        .unwrap_or(false)
}

/// Wait out a delay, returning false if stop was signaled first.
pub async fn wait_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
