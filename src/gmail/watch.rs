//! Label watch: push notifications via Pub/Sub and what to do with them.
//!
//! [`listen`] pulls the subscription until Ctrl-C, decoding each message as a
//! Gmail [`Notification`] and handing it to a [`NotificationHandler`]. Every
//! pulled message is acknowledged, including ones the handler fails on.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::auth::{ServiceAccountCredentials, UserCredentials, PUBSUB_SCOPE};
use super::client::GmailClient;
use super::message::header;
use super::mime::OutgoingMessage;
use super::pubsub::{Notification, PubSubClient, ReceivedMessage};
use crate::config::Config;

const MAX_MESSAGES: u32 = 10;

pub const AUTOREPLY_BODY: &str = "Thank you for your email.\n\n\
This is an automated draft reply from our system.\n\
Someone will get back to you shortly.";

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, notification: &Notification) -> Result<()>;
}

/// Logs the ids of messages added since the notification's history id.
pub struct HistoryLogger {
    pub gmail: GmailClient,
}

#[async_trait]
impl NotificationHandler for HistoryLogger {
    async fn handle(&self, notification: &Notification) -> Result<()> {
        let Some(history_id) = notification.history_id.as_deref() else {
            tracing::warn!("No historyId found in the notification.");
            return Ok(());
        };
        let added = self
            .gmail
            .history_added(history_id)
            .await
            .with_context(|| format!("Error processing history since {}", history_id))?;
        if added.is_empty() {
            tracing::info!("No new history items found.");
        }
        for id in added {
            tracing::info!("New message added: {}", id);
        }
        Ok(())
    }
}

/// Drafts a fixed acknowledgement for every unread message in a label.
pub struct AutoReplier {
    pub gmail: GmailClient,
    pub label: String,
    pub mark_read: bool,
}

impl AutoReplier {
    /// Returns the ids of the messages a draft was created for.
    pub async fn process_unread(&self) -> Result<Vec<String>> {
        let query = format!("label:{} is:unread", self.label);
        let ids = self.gmail.list_message_ids(&query).await?;
        if ids.is_empty() {
            tracing::info!("No new messages found in '{}' label.", self.label);
            return Ok(Vec::new());
        }

        let mut drafted = Vec::new();
        for id in ids {
            let message = self.gmail.get_message(&id).await?;
            let payload = message.get("payload").unwrap_or(&serde_json::Value::Null);
            let from = header(payload, "From").unwrap_or_default();
            let subject = header(payload, "Subject").unwrap_or("No Subject");

            tracing::info!("Creating draft reply to {} for msg_id={}", from, id);
            let reply = OutgoingMessage::plain(AUTOREPLY_BODY.to_string())
                .header("To", from)
                .header("Subject", format!("Re: {}", subject));
            self.gmail.create_draft(&reply.to_raw()).await?;

            if self.mark_read {
                self.gmail.modify_labels(&id, &[], &["UNREAD"]).await?;
            }
            drafted.push(id);
        }
        Ok(drafted)
    }
}

#[async_trait]
impl NotificationHandler for AutoReplier {
    async fn handle(&self, _notification: &Notification) -> Result<()> {
        self.process_unread().await.map(|_| ())
    }
}

/// Hand each message to `handler`, then acknowledge the whole batch.
pub async fn dispatch(
    pubsub: &PubSubClient,
    subscription: &str,
    messages: Vec<ReceivedMessage>,
    handler: &dyn NotificationHandler,
) -> Result<()> {
    let mut ack_ids = Vec::with_capacity(messages.len());
    for message in messages {
        tracing::info!(
            "Received Pub/Sub message: {}",
            String::from_utf8_lossy(&message.data)
        );
        let result = match Notification::parse(&message.data) {
            Ok(notification) => handler.handle(&notification).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!("Error processing Pub/Sub message: {:#}", e);
        }
        ack_ids.push(message.ack_id);
    }
    pubsub.acknowledge(subscription, &ack_ids).await
}

/// Pull `subscription` until `shutdown` resolves.
pub async fn listen(
    pubsub: &PubSubClient,
    subscription: &str,
    poll_interval: Duration,
    handler: &dyn NotificationHandler,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    tracing::info!("Listening for messages on {}...", subscription);

    loop {
        let pulled = tokio::select! {
            _ = &mut shutdown => break,
            pulled = pubsub.pull(subscription, MAX_MESSAGES) => pulled,
        };

        match pulled {
            Ok(messages) if !messages.is_empty() => {
                if let Err(e) = dispatch(pubsub, subscription, messages, handler).await {
                    tracing::error!("Failed to acknowledge messages: {:#}", e);
                }
                continue;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Pull failed: {:#}", e),
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::info!("Stopped listening on {}", subscription);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    eprintln!("Received shutdown signal");
}

/// Resolve `label`, register the watch and return the clients.
async fn start_watch(config: &Config, label: &str) -> Result<(GmailClient, PubSubClient)> {
    let topic = config.gmail.topic_path()?;

    let credentials = UserCredentials::authorize(&config.gmail).await?;
    let gmail = GmailClient::new(&config.gmail.api_base, Arc::new(credentials))?;

    let Some(label_id) = gmail.label_id(label).await? else {
        bail!("Label '{}' not found in your Gmail account.", label);
    };
    tracing::info!("Found label '{}' with ID: {}", label, label_id);

    let response = gmail.watch(&[label_id], &topic).await?;
    tracing::info!("Watch setup response: {}", response);

    let service_account =
        ServiceAccountCredentials::load(&config.gmail.service_account_file, PUBSUB_SCOPE)?;
    let pubsub = PubSubClient::new(&config.gmail.pubsub_base, Arc::new(service_account))?;
    Ok((gmail, pubsub))
}

/// `courier gmail watch`.
pub async fn run_watch(config: &Config, label: Option<&str>) -> Result<()> {
    let label = label.unwrap_or(&config.gmail.label);
    let subscription = config.gmail.subscription_path()?;
    let (gmail, pubsub) = start_watch(config, label).await?;

    let handler = HistoryLogger { gmail };
    listen(
        &pubsub,
        &subscription,
        Duration::from_secs(config.gmail.poll_interval_secs),
        &handler,
        shutdown_signal(),
    )
    .await
}

/// `courier gmail autoreply`.
pub async fn run_autoreply(config: &Config, label: Option<&str>, mark_read: bool) -> Result<()> {
    let label = label.unwrap_or(&config.gmail.label);
    let subscription = config.gmail.subscription_path()?;
    tracing::info!("Subscribing to Gmail watch notifications...");
    let (gmail, pubsub) = start_watch(config, label).await?;

    let handler = AutoReplier {
        gmail,
        label: label.to_string(),
        mark_read,
    };
    listen(
        &pubsub,
        &subscription,
        Duration::from_secs(config.gmail.poll_interval_secs),
        &handler,
        shutdown_signal(),
    )
    .await
}
