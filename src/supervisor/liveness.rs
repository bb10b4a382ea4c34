//! Liveness self-ping
//!
//! Hosting platforms idle a service that receives no traffic. Probing our
//! own `/health` endpoint keeps it warm and surfaces a wedged server in
//! the logs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::{Error, Result};

/// Periodically probes the health endpoint
pub struct LivenessPinger {
    url: String,
    interval: Duration,
    timeout: Duration,
    client: Client,
}

impl LivenessPinger {
    /// Create a pinger for `url` with a 20 s interval and 5 s request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timing(url, Duration::from_secs(20), Duration::from_secs(5))
    }

    /// Create a pinger with explicit timing
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_timing(
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            interval,
            timeout,
            client,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a single probe
    ///
    /// Any HTTP status counts as a response; only transport failures and
    /// timeouts are errors.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint cannot be reached
    pub async fn ping_once(&self) -> Result<StatusCode> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Http(e)
                }
            })?;
        Ok(response.status())
    }

    /// Probe once per interval, forever
    ///
    /// The first probe waits one full interval so the server has time to bind.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            url = %self.url,
            interval_secs = self.interval.as_secs(),
            "liveness pinger started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            match self.ping_once().await {
                Ok(status) if status.is_success() => {
                    tracing::debug!(status = status.as_u16(), "liveness ping ok");
                }
                Ok(status) => {
                    tracing::debug!(status = status.as_u16(), "liveness ping answered, not ready");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "liveness ping failed");
                }
            }
        }
    }
}
