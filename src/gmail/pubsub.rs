//! Pull-subscription client for Cloud Pub/Sub over REST.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::auth::TokenProvider;
use crate::error::{json_or_status, ApiError};

const SERVICE: &str = "Pub/Sub";

/// A message pulled from a subscription. `data` is already base64-decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub data: Vec<u8>,
}

/// Payload Gmail publishes on mailbox changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub history_id: Option<String>,
}

impl Notification {
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Notification is not valid JSON")
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Clone)]
pub struct PubSubClient {
    http: reqwest::Client,
    base: String,
    auth: Arc<dyn TokenProvider>,
}

impl PubSubClient {
    pub fn new(base: &str, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            auth,
        })
    }

    async fn post(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                service: SERVICE,
                source,
            })?;
        Ok(json_or_status(SERVICE, resp).await?)
    }

    /// Pull up to `max_messages` from `subscription`
    /// (`projects/<p>/subscriptions/<s>`). Returns an empty list when idle.
    pub async fn pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<ReceivedMessage>> {
        let json = self
            .post(
                format!("{}/{}:pull", self.base, subscription),
                serde_json::json!({ "maxMessages": max_messages }),
            )
            .await?;

        let mut out = Vec::new();
        for received in json
            .get("receivedMessages")
            .and_then(|m| m.as_array())
            .into_iter()
            .flatten()
        {
            let Some(ack_id) = received.get("ackId").and_then(|a| a.as_str()) else {
                continue;
            };
            let data = match received.pointer("/message/data").and_then(|d| d.as_str()) {
                Some(encoded) => STANDARD.decode(encoded).unwrap_or_else(|e| {
                    tracing::warn!("Undecodable message data ({}); treating as empty", e);
                    Vec::new()
                }),
                None => Vec::new(),
            };
            out.push(ReceivedMessage {
                ack_id: ack_id.to_string(),
                data,
            });
        }
        Ok(out)
    }

    pub async fn acknowledge(&self, subscription: &str, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.post(
            format!("{}/{}:acknowledge", self.base, subscription),
            serde_json::json!({ "ackIds": ack_ids }),
        )
        .await?;
        Ok(())
    }
}
