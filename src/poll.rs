//! Readiness polling for `wait-on` URLs.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Delay between failed probes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a URL until it answers or a deadline passes.
///
/// Retries happen at a fixed interval. There is no backoff: readiness
/// checks in CI are short-lived and a constant cadence keeps the timing
/// predictable.
#[derive(Debug, Clone)]
pub struct NetworkPoller {
    client: reqwest::Client,
    interval: Duration,
}

impl Default for NetworkPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkPoller {
    /// Creates a poller with the default one second retry interval.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Sets the retry interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the retry interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probes `url` until it responds with a 2xx/3xx status.
    ///
    /// Fails with [`Error::PollTimeout`] once more than `timeout` has elapsed
    /// since the first attempt.
    pub async fn poll_until_ready(&self, url: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let mut attempts = 0u32;

        tracing::info!(url = %url, timeout_secs = timeout.as_secs(), "waiting for url");

        loop {
            attempts += 1;
            let remaining = timeout.saturating_sub(started.elapsed());

            match tokio::time::timeout(remaining.max(Duration::from_millis(1)), self.probe(url))
                .await
            {
                Ok(Ok(())) => {
                    tracing::info!(url = %url, attempts, elapsed = ?started.elapsed(), "url is ready");
                    return Ok(());
                }
                Ok(Err(reason)) => {
                    tracing::debug!(url = %url, attempts, reason = %reason, "probe failed");
                }
                Err(_) => {
                    tracing::debug!(url = %url, attempts, "probe timed out");
                }
            }

            if started.elapsed() >= timeout {
                tracing::warn!(url = %url, attempts, "gave up waiting for url");
                return Err(Error::PollTimeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn probe(&self, url: &str) -> std::result::Result<(), String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(format!("status {}", status))
        }
    }
}
