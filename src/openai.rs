//! Minimal OpenAI REST client shared by the embeddings and chat paths.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::Result;
use std::time::Duration;

use crate::config::OpenAIConfig;
use crate::error::{backoff_delay, json_or_status, ApiError};

const SERVICE: &str = "OpenAI";

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIClient {
    /// Build a client from `[openai]`, resolving the API key.
    pub fn from_config(config: &OpenAIConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(config, api_key)
    }

    pub fn new(config: &OpenAIConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// `POST {base_url}/{path}` with a JSON body, retrying transient failures.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut last_err: Option<ApiError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    "Retrying {} in {}s (attempt {}/{})",
                    path,
                    delay.as_secs(),
                    attempt,
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let result = match resp {
                Ok(response) => json_or_status(SERVICE, response).await,
                Err(source) => Err(ApiError::Transport {
                    service: SERVICE,
                    source,
                }),
            };

            match result {
                Ok(json) => return Ok(json),
                Err(e) if e.is_retryable() => {
                    tracing::debug!("{}", e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(match last_err {
            Some(e) => anyhow::Error::new(e).context(format!(
                "{} failed after {} retries",
                path, self.max_retries
            )),
            None => anyhow::anyhow!("{} failed after retries", path),
        })
    }
}
