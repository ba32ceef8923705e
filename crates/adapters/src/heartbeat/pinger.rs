use std::time::Duration;

use tokio_util::sync::CancellationToken;

use application::retry::{retry_with_backoff, RetryConfig};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Uptime heartbeat: `GET <base>/ping/<identifier>` with the `apikey`
/// header, once a minute, three retries with exponential backoff per
/// attempt. A failed heartbeat is logged and the loop keeps going.
pub struct HeartbeatPinger {
    client: reqwest::Client,
    base_url: String,
    identifier: String,
    api_key: String,
    retry: RetryConfig,
}

impl HeartbeatPinger {
    pub fn new(
        base_url: impl Into<String>,
        identifier: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("traffic-sensor/0.1")
            .build()
            .map_err(|e| format!("heartbeat client init failed: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identifier: identifier.into(),
            api_key: api_key.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Shrink the retry schedule, for tests.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self) -> String {
        format!("{}/ping/{}", self.base_url, self.identifier)
    }

    /// One heartbeat, with the full retry budget.
    pub async fn send(&self) -> Result<(), String> {
        let url = self.url();
        retry_with_backoff(&self.retry, || {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header("apikey", &self.api_key)
                    .send()
                    .await
                    .map_err(|e| format!("heartbeat request failed: {e}"))?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(format!("heartbeat returned HTTP {}", response.status()))
                }
            }
        })
        .await
    }

    /// Heartbeat loop: every minute until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await; // skip the immediate tick, bootstrap just ran
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("heartbeat loop exiting");
                    return;
                }
                _ = ticker.tick() => {
                    match self.send().await {
                        Ok(()) => tracing::debug!("heartbeat delivered"),
                        Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
                    }
                }
            }
        }
    }
}
