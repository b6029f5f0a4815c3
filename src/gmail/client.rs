use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::auth::TokenProvider;
use crate::error::{json_or_status, ApiError};

const SERVICE: &str = "Gmail";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Gmail REST client for the authenticated user (`users/me`).
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base: String,
    auth: Arc<dyn TokenProvider>,
}

impl GmailClient {
    pub fn new(api_base: &str, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base: format!("{}/users/me", api_base.trim_end_matches('/')),
            auth,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(format!("{}/{}", self.base, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                service: SERVICE,
                source,
            })?;
        Ok(json_or_status(SERVICE, resp).await?)
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/{}", self.base, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                service: SERVICE,
                source,
            })?;
        Ok(json_or_status(SERVICE, resp).await?)
    }

    pub async fn profile(&self) -> Result<serde_json::Value> {
        self.get("profile", &[]).await
    }

    pub async fn email_address(&self) -> Result<String> {
        let profile = self.profile().await?;
        profile
            .get("emailAddress")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .context("Profile response missing emailAddress")
    }

    pub async fn labels(&self) -> Result<Vec<Label>> {
        let json = self.get("labels", &[]).await?;
        let labels = json
            .get("labels")
            .cloned()
            .unwrap_or_else(|| serde_json::json!([]));
        Ok(serde_json::from_value(labels).context("Invalid labels response")?)
    }

    /// Id of the label whose name matches `name`, ignoring case.
    pub async fn label_id(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .labels()
            .await?
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| l.id))
    }

    /// Ids of every message matching the search query, following pagination.
    pub async fn list_message_ids(&self, q: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if !q.is_empty() {
                query.push(("q", q));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let json = self.get("messages", &query).await?;

            if let Some(messages) = json.get("messages").and_then(|m| m.as_array()) {
                ids.extend(
                    messages
                        .iter()
                        .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                        .map(str::to_string),
                );
            }

            match json.get("nextPageToken").and_then(|t| t.as_str()) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(ids)
    }

    /// Full message resource (`format=full`): headers, labels, MIME parts.
    pub async fn get_message(&self, id: &str) -> Result<serde_json::Value> {
        self.get(&format!("messages/{}", id), &[("format", "full")])
            .await
    }

    /// Ids of messages added since `start_history_id`, in history order.
    pub async fn history_added(&self, start_history_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("startHistoryId", start_history_id)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let json = self.get("history", &query).await?;

            for item in json
                .get("history")
                .and_then(|h| h.as_array())
                .into_iter()
                .flatten()
            {
                for added in item
                    .get("messagesAdded")
                    .and_then(|m| m.as_array())
                    .into_iter()
                    .flatten()
                {
                    if let Some(id) = added.pointer("/message/id").and_then(|v| v.as_str()) {
                        ids.push(id.to_string());
                    }
                }
            }

            match json.get("nextPageToken").and_then(|t| t.as_str()) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(ids)
    }

    /// Register push notifications for `label_ids` on a Pub/Sub topic.
    pub async fn watch(&self, label_ids: &[String], topic_name: &str) -> Result<serde_json::Value> {
        self.post(
            "watch",
            &serde_json::json!({
                "labelIds": label_ids,
                "topicName": topic_name,
            }),
        )
        .await
    }

    pub async fn create_draft(&self, raw: &str) -> Result<serde_json::Value> {
        self.post("drafts", &serde_json::json!({ "message": { "raw": raw } }))
            .await
    }

    pub async fn send(&self, raw: &str) -> Result<serde_json::Value> {
        self.post("messages/send", &serde_json::json!({ "raw": raw }))
            .await
    }

    pub async fn modify_labels(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<serde_json::Value> {
        self.post(
            &format!("messages/{}/modify", id),
            &serde_json::json!({
                "addLabelIds": add,
                "removeLabelIds": remove,
            }),
        )
        .await
    }
}
