use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use super::auth::UserCredentials;
use super::client::GmailClient;
use super::message::{build_query, email_record};
use crate::config::Config;
use crate::models::EmailRecord;

/// Fetch every message matching `query`. Messages that fail to load are
/// logged and left out.
pub async fn fetch_records(client: &GmailClient, query: &str) -> Result<Vec<EmailRecord>> {
    let ids = client.list_message_ids(query).await?;
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        match client.get_message(&id).await {
            Ok(message) => records.push(email_record(&message)),
            Err(e) => {
                tracing::error!("Failed to retrieve details for message ID {}: {:#}", id, e)
            }
        }
    }
    Ok(records)
}

pub fn save_records(path: &Path, records: &[EmailRecord]) {
    let result = serde_json::to_string_pretty(records)
        .map_err(anyhow::Error::from)
        .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
    match result {
        Ok(()) => tracing::info!("Emails successfully saved to '{}'", path.display()),
        Err(e) => tracing::error!("Failed to save emails to file: {:#}", e),
    }
}

pub struct ReadFilters<'a> {
    pub label: Option<&'a str>,
    pub unread: bool,
    pub subject: Option<&'a str>,
    pub sender: Option<&'a str>,
    pub output: Option<&'a Path>,
}

/// `courier gmail read`.
pub async fn run_read(config: &Config, filters: ReadFilters<'_>) -> Result<()> {
    if filters.label.is_none()
        && !filters.unread
        && filters.subject.is_none()
        && filters.sender.is_none()
        && filters.output.is_none()
    {
        bail!("Specify at least one of --label, --unread, --subject, --sender or --output");
    }

    let query = build_query(
        filters.label,
        filters.unread,
        filters.subject,
        filters.sender,
    );
    tracing::info!("Using query: {}", query);

    let credentials = UserCredentials::authorize(&config.gmail).await?;
    let client = GmailClient::new(&config.gmail.api_base, Arc::new(credentials))?;

    let records = fetch_records(&client, &query).await?;
    tracing::info!("Found {} emails matching the criteria.", records.len());

    println!("{}", serde_json::to_string_pretty(&records)?);
    save_records(
        filters.output.unwrap_or(&config.gmail.emails_file),
        &records,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_records_round_trip_through_reply_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.json");
        let records = vec![EmailRecord {
            id: "m1".into(),
            sender: "Ann <ann@example.com>".into(),
            subject: "Hi".into(),
            time: "Mon".into(),
            label: "INBOX, UNREAD".into(),
            unread: true,
            email: "<p>x</p>".into(),
        }];
        save_records(&path, &records);

        let loaded = crate::gmail::reply::load_original_emails(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0]["sender"], "Ann <ann@example.com>");
        assert_eq!(loaded[0]["unread"], true);
    }

    #[test]
    fn save_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        save_records(&dir.path().join("missing/dir/emails.json"), &[]);
    }
}
