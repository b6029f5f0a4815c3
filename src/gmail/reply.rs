//! Replies to previously read emails, sent directly or left as unread drafts.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use super::auth::UserCredentials;
use super::client::GmailClient;
use super::mime::{decode_mime_header, OutgoingMessage};
use crate::config::Config;

/// Load the emails to reply to from a JSON file, or stdin when `source` is `-`.
///
/// A single object is one email; a list must not be empty.
pub fn load_original_emails(source: &str) -> Result<Vec<serde_json::Value>> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read email data from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read email data from {}", source))?
    };
    parse_original_emails(&content)
}

pub fn parse_original_emails(content: &str) -> Result<Vec<serde_json::Value>> {
    let data: serde_json::Value =
        serde_json::from_str(content).context("Email data is not valid JSON")?;
    match data {
        serde_json::Value::Object(_) => Ok(vec![data]),
        serde_json::Value::Array(list) if list.is_empty() => bail!("No emails found in JSON file."),
        serde_json::Value::Array(list) => Ok(list),
        _ => bail!("Invalid JSON format."),
    }
}

/// Signature HTML, trimmed. A missing or unreadable file yields `""`.
pub fn load_signature(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Signature file '{}' not found.", path.display());
            String::new()
        }
        Err(e) => {
            tracing::error!("Error loading signature: {}", e);
            String::new()
        }
    }
}

pub fn parse_cc(raw: &str) -> Result<Vec<String>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("Invalid JSON format in CC argument")?;
    let list = value
        .as_array()
        .context("CC argument must be a JSON array of email addresses.")?;
    list.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .context("CC entries must be strings")
        })
        .collect()
}

pub fn reply_subject(subject: &str) -> String {
    let is_reply = subject
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("re:"));
    if is_reply {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    pub recipient: String,
    pub response: Option<String>,
    pub cc: Vec<String>,
    pub label: Option<String>,
    pub signature: Option<String>,
}

fn str_field<'a>(email: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    email.get(key).and_then(|v| v.as_str())
}

/// Build an HTML reply quoting the original in Gmail's reply layout.
pub fn build_reply(opts: &ReplyOptions, original: &serde_json::Value) -> OutgoingMessage {
    let subject = decode_mime_header(str_field(original, "subject").unwrap_or("No Subject"));
    let sender = decode_mime_header(str_field(original, "sender").unwrap_or("Unknown Sender"));
    let date = str_field(original, "time")
        .or_else(|| str_field(original, "date"))
        .unwrap_or("Unknown Date");
    let orig_html = str_field(original, "html_text")
        .or_else(|| str_field(original, "email"))
        .unwrap_or("");

    let body = format!(
        "<html><body>\
         <div style='font-family:Arial,sans-serif;font-size:14px;'>\
         <p>{response}</p>{signature}</div><br>\
         <div style='font-size:12px;color:#777;margin-bottom:5px;'>On {date}, {sender} wrote:</div>\
         <blockquote style='margin:0 0 0 0.8ex;border-left:1px solid #ccc;padding-left:1ex;'>{orig_html}</blockquote>\
         </body></html>",
        response = opts.response.as_deref().unwrap_or(""),
        signature = opts.signature.as_deref().unwrap_or(""),
    );

    let mut msg = OutgoingMessage::html(body).header("To", opts.recipient.clone());
    if !opts.cc.is_empty() {
        msg = msg.header("Cc", opts.cc.join(", "));
    }
    msg = msg.header("Subject", reply_subject(&subject));
    if let Some(label) = opts.label.as_deref().filter(|l| !l.is_empty()) {
        msg = msg.header("X-Label", label);
    }
    msg
}

/// Send each reply, or store it as a draft marked unread.
pub async fn send_replies(
    client: &GmailClient,
    opts: &ReplyOptions,
    emails: &[serde_json::Value],
    draft: bool,
) -> Result<Vec<serde_json::Value>> {
    let mut results = Vec::with_capacity(emails.len());
    for (i, email) in emails.iter().enumerate() {
        tracing::info!("Processing email {} of {}...", i + 1, emails.len());
        let raw = build_reply(opts, email).to_raw();

        let result = if draft {
            let created = client.create_draft(&raw).await?;
            let message_id = created
                .pointer("/message/id")
                .and_then(|v| v.as_str())
                .context("Draft response missing message id")?;
            client.modify_labels(message_id, &["UNREAD"], &[]).await?;
            tracing::info!("Draft {} created and marked as unread.", i + 1);
            created
        } else {
            let sent = client.send(&raw).await?;
            tracing::info!("Message {} sent successfully.", i + 1);
            sent
        };
        results.push(result);
    }
    Ok(results)
}

pub struct ReplyArgs<'a> {
    pub recipient: &'a str,
    pub original: Option<&'a str>,
    pub response: Option<&'a str>,
    pub cc: Option<&'a str>,
    /// `Some(None)` means "use the configured signature file".
    pub signature: Option<Option<&'a Path>>,
    pub label: Option<&'a str>,
    pub draft: bool,
}

/// `courier gmail reply`.
pub async fn run_reply(config: &Config, args: ReplyArgs<'_>) -> Result<()> {
    let cc = args.cc.map(parse_cc).transpose()?.unwrap_or_default();
    let signature = args
        .signature
        .map(|p| load_signature(p.unwrap_or(&config.gmail.signature_file)));

    let default_original = config.gmail.emails_file.display().to_string();
    let emails = load_original_emails(args.original.unwrap_or(&default_original))?;

    let credentials = UserCredentials::authorize(&config.gmail).await?;
    let client = GmailClient::new(&config.gmail.api_base, Arc::new(credentials))?;
    tracing::info!("Gmail service initialized successfully.");

    let opts = ReplyOptions {
        recipient: args.recipient.to_string(),
        response: args.response.map(str::to_string),
        cc,
        label: args.label.map(str::to_string),
        signature,
    };
    let results = send_replies(&client, &opts, &emails, args.draft).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn decoded_body(msg: &OutgoingMessage) -> String {
        let text = msg.to_rfc822();
        let body = text.split("\r\n\r\n").nth(1).unwrap().replace("\r\n", "");
        String::from_utf8(
            base64::engine::general_purpose::STANDARD
                .decode(body)
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn original_emails_shapes() {
        assert_eq!(parse_original_emails(r#"{"id":"1"}"#).unwrap().len(), 1);
        assert_eq!(
            parse_original_emails(r#"[{"id":"1"},{"id":"2"}]"#)
                .unwrap()
                .len(),
            2
        );
        assert!(parse_original_emails("[]").is_err());
        assert!(parse_original_emails("42").is_err());
        assert!(parse_original_emails("{").is_err());
    }

    #[test]
    fn cc_must_be_string_array() {
        assert_eq!(
            parse_cc(r#"["a@x.com","b@y.com"]"#).unwrap(),
            vec!["a@x.com", "b@y.com"]
        );
        assert!(parse_cc(r#""a@x.com""#).is_err());
        assert!(parse_cc(r#"[1]"#).is_err());
        assert!(parse_cc("nope").is_err());
    }

    #[test]
    fn subject_prefix_not_doubled() {
        assert_eq!(reply_subject("Hello"), "Re: Hello");
        assert_eq!(reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(reply_subject("re:x"), "re:x");
        assert_eq!(reply_subject(""), "Re: ");
        assert_eq!(reply_subject("Ré"), "Re: Ré");
    }

    #[test]
    fn missing_signature_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_signature(&dir.path().join("none.html")), "");
        let path = dir.path().join("sig.html");
        std::fs::write(&path, "\n<b>Ann</b>\n").unwrap();
        assert_eq!(load_signature(&path), "<b>Ann</b>");
    }

    #[test]
    fn reply_layout_and_headers() {
        let opts = ReplyOptions {
            recipient: "ann@example.com".into(),
            response: Some("Thanks!".into()),
            cc: vec!["a@x.com".into(), "b@y.com".into()],
            label: Some("replied".into()),
            signature: Some("<i>Bob</i>".into()),
        };
        let original = serde_json::json!({
            "subject": "=?utf-8?q?Caf=C3=A9?=",
            "sender": "Ann <ann@example.com>",
            "time": "Mon, 3 Feb 2025",
            "email": "<p>orig</p>"
        });
        let msg = build_reply(&opts, &original);
        assert_eq!(msg.get_header("To"), Some("ann@example.com"));
        assert_eq!(msg.get_header("Cc"), Some("a@x.com, b@y.com"));
        assert_eq!(msg.get_header("Subject"), Some("Re: Café"));
        assert_eq!(msg.get_header("X-Label"), Some("replied"));

        let expected = "<html><body><div style='font-family:Arial,sans-serif;font-size:14px;'>\
            <p>Thanks!</p><i>Bob</i></div><br>\
            <div style='font-size:12px;color:#777;margin-bottom:5px;'>On Mon, 3 Feb 2025, Ann <ann@example.com> wrote:</div>\
            <blockquote style='margin:0 0 0 0.8ex;border-left:1px solid #ccc;padding-left:1ex;'><p>orig</p></blockquote>\
            </body></html>";
        assert_eq!(decoded_body(&msg), expected);
    }

    #[test]
    fn defaults_for_missing_fields() {
        let opts = ReplyOptions {
            recipient: "x@y".into(),
            ..Default::default()
        };
        let original = serde_json::json!({
            "date": "yesterday",
            "html_text": "<b>h</b>",
            "email": "ignored"
        });
        let msg = build_reply(&opts, &original);
        assert_eq!(msg.get_header("Subject"), Some("Re: No Subject"));
        assert!(msg.get_header("Cc").is_none());
        assert!(msg.get_header("X-Label").is_none());
        let body = decoded_body(&msg);
        assert!(body.contains("<p></p></div>"));
        assert!(body.contains("On yesterday, Unknown Sender wrote:"));
        assert!(body.contains("padding-left:1ex;'><b>h</b></blockquote>"));
    }
}
