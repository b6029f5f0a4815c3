//! Mailbox tools on top of the Gmail REST API.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | OAuth user consent, token storage and refresh, service accounts |
//! | [`client`] | `users/me` REST calls |
//! | [`message`] | Search queries and [`EmailRecord`](crate::models::EmailRecord) extraction |
//! | [`mime`] | Header decoding and single-part message rendering |
//! | [`pubsub`] | Pull subscription over REST |
//! | [`read`] | `courier gmail read` |
//! | [`reply`] | `courier gmail reply` |
//! | [`watch`] | `courier gmail watch` / `autoreply` |

pub mod auth;
pub mod client;
pub mod message;
pub mod mime;
pub mod pubsub;
pub mod read;
pub mod reply;
pub mod watch;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;

/// `courier gmail auth`: authorize (running the consent flow if needed) and
/// report the account.
pub async fn run_auth(config: &Config) -> Result<()> {
    let credentials = auth::UserCredentials::authorize(&config.gmail).await?;
    let client = client::GmailClient::new(&config.gmail.api_base, Arc::new(credentials))?;
    let email = client.email_address().await?;
    println!("Authenticated as: {}", email);
    Ok(())
}
