use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use domain::arbiter::entity::{AlertEvent, Recommendation, SyncSettings};
use domain::arbiter::error::ArbiterError;
use domain::policy::entity::Blocklist;
use domain::score::entity::{ScoreRecord, ScoreUpdate};
use ports::secondary::policy_source::PolicySource;
use ports::secondary::submission_sink::SubmissionSink;

use super::archive::decode_score_archive;

/// Maximum score-snapshot body size: 100 MiB. Prevents OOM from a
/// misbehaving arbiter returning unbounded data.
const MAX_SNAPSHOT_SIZE: usize = 100 * 1024 * 1024;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct BlocklistsResponse {
    blocklists: Vec<Blocklist>,
}

#[derive(Deserialize)]
struct WhitelistResponse {
    cidrs: Vec<String>,
}

/// Authenticated HTTP client for the arbiter.
///
/// Every request carries the `X_AUTH_KEY` / `X_SENSOR_NAME` headers.
/// Transport failures and 5xx responses are retried with exponential
/// backoff; a 429 is returned immediately as a typed rate-limit error so
/// the caller can park the submission; other non-2xx statuses are
/// non-retriable and carry the response body.
pub struct ArbiterApi {
    client: reqwest::Client,
    base_url: String,
    auth_key: String,
    sensor_name: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl ArbiterApi {
    pub fn new(
        base_url: impl Into<String>,
        auth_key: impl Into<String>,
        sensor_name: impl Into<String>,
        insecure_skip_verify_tls: bool,
    ) -> Result<Self, ArbiterError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("traffic-sensor/0.1")
            .danger_accept_invalid_certs(insecure_skip_verify_tls)
            .build()
            .map_err(|e| ArbiterError::Transport {
                attempts: 0,
                message: format!("HTTP client init failed: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_key: auth_key.into(),
            sensor_name: sensor_name.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        })
    }

    /// Shrink the retry budget/backoff, for tests.
    pub fn with_retry(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Perform one authenticated request with the full retry policy.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ArbiterError> {
        let url = self.url_for(path);
        let mut backoff = self.initial_backoff;
        let mut attempts = 0u32;
        let mut last_transport_error = String::new();

        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X_AUTH_KEY", &self.auth_key)
                .header("X_SENSOR_NAME", &self.sensor_name);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_transport_error = e.to_string();
                    tracing::warn!(
                        attempt = attempts,
                        url = %url,
                        error = %e,
                        "arbiter request failed"
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    return Err(ArbiterError::Transport {
                        attempts,
                        message: last_transport_error,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 {
                let message = response.text().await.unwrap_or_default();
                return Err(ArbiterError::RateLimited { message });
            }

            if status.is_server_error() {
                tracing::warn!(
                    attempt = attempts,
                    url = %url,
                    status = status.as_u16(),
                    "arbiter server error"
                );
                if attempt < self.max_retries {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
                return Err(ArbiterError::Server {
                    status: status.as_u16(),
                });
            }

            let body = response.text().await.unwrap_or_default();
            tracing::error!(url = %url, status = status.as_u16(), body = %body,
                "non-retriable arbiter response");
            return Err(ArbiterError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Err(ArbiterError::Transport {
            attempts,
            message: last_transport_error,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ArbiterError> {
        let response = self.request(reqwest::Method::GET, path, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ArbiterError::Decode(e.to_string()))
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<(), ArbiterError> {
        let body = serde_json::to_value(payload).map_err(|e| ArbiterError::Decode(e.to_string()))?;
        self.request(reqwest::Method::POST, path, Some(&body))
            .await?;
        Ok(())
    }

    /// Download the score snapshot archive body, capped in size, and
    /// decode it.
    async fn download_snapshot(&self) -> Result<Vec<ScoreRecord>, ArbiterError> {
        let mut response = self.request(reqwest::Method::GET, "/sync/score", None).await?;

        let content_length: usize = response
            .content_length()
            .unwrap_or(0)
            .try_into()
            .unwrap_or(usize::MAX);
        if content_length > MAX_SNAPSHOT_SIZE {
            return Err(ArbiterError::Decode(format!(
                "score snapshot too large: {content_length} bytes"
            )));
        }

        let mut body = Vec::with_capacity(content_length.min(MAX_SNAPSHOT_SIZE));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ArbiterError::Decode(format!("snapshot body read failed: {e}")))?
        {
            if body.len() + chunk.len() > MAX_SNAPSHOT_SIZE {
                return Err(ArbiterError::Decode(
                    "score snapshot exceeded size limit".to_string(),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        decode_score_archive(&body)
    }
}

impl SubmissionSink for ArbiterApi {
    fn send_alert<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            self.post_json("/alert", alert).await?;
            tracing::debug!(ip = %alert.ip, "alert delivered");
            Ok(())
        })
    }

    fn send_recommendation<'a>(
        &'a self,
        recommendation: &'a Recommendation,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            self.post_json("/recommend", recommendation).await?;
            tracing::debug!(ip = %recommendation.ip, "recommendation delivered");
            Ok(())
        })
    }
}

impl PolicySource for ArbiterApi {
    fn fetch_sensor_config(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SyncSettings, ArbiterError>> + Send + '_>> {
        Box::pin(self.get_json::<SyncSettings>("/sync"))
    }

    fn fetch_blocklists(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Blocklist>, ArbiterError>> + Send + '_>> {
        Box::pin(async move {
            let response: BlocklistsResponse = self.get_json("/sync/blocklist").await?;
            Ok(response.blocklists)
        })
    }

    fn fetch_whitelist(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ArbiterError>> + Send + '_>> {
        Box::pin(async move {
            let response: WhitelistResponse = self.get_json("/sync/whitelist").await?;
            Ok(response.cidrs)
        })
    }

    fn fetch_score_snapshot(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreRecord>, ArbiterError>> + Send + '_>> {
        Box::pin(self.download_snapshot())
    }

    fn fetch_score_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreUpdate>, ArbiterError>> + Send + '_>> {
        Box::pin(self.get_json::<Vec<ScoreUpdate>>("/score-updates"))
    }
}
