//! Turning Gmail message resources into [`EmailRecord`]s.

use crate::models::EmailRecord;

use super::mime::decode_base64url;

pub const NO_HTML: &str = "No HTML content found.";

/// Gmail search query from the read filters, e.g.
/// `label:INBOX is:unread subject:"Meeting" from:boss@example.com`.
pub fn build_query(
    label: Option<&str>,
    unread: bool,
    subject: Option<&str>,
    sender: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(label) = label {
        parts.push(format!("label:{}", label));
    }
    if unread {
        parts.push("is:unread".to_string());
    }
    if let Some(subject) = subject {
        parts.push(format!("subject:\"{}\"", subject));
    }
    if let Some(sender) = sender {
        parts.push(format!("from:{}", sender));
    }
    parts.join(" ")
}

/// Header value from a part's `headers` array, matched case-insensitively.
pub fn header<'a>(part: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    part.get("headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(|n| n.as_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value"))
        .and_then(|v| v.as_str())
}

fn is_attachment(part: &serde_json::Value) -> bool {
    let has_filename = part
        .get("filename")
        .and_then(|f| f.as_str())
        .is_some_and(|f| !f.is_empty());
    let disposition = header(part, "Content-Disposition")
        .is_some_and(|d| d.to_ascii_lowercase().contains("attachment"));
    has_filename || disposition
}

/// First non-attachment `text/html` body, depth first.
pub fn find_html(part: &serde_json::Value) -> Option<String> {
    let mime = part.get("mimeType").and_then(|m| m.as_str()).unwrap_or("");
    if mime.eq_ignore_ascii_case("text/html") && !is_attachment(part) {
        if let Some(data) = part.pointer("/body/data").and_then(|d| d.as_str()) {
            return match decode_base64url(data) {
                Some(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                None => {
                    tracing::error!("Error decoding HTML part");
                    Some("Error decoding HTML content".to_string())
                }
            };
        }
    }
    part.get("parts")
        .and_then(|p| p.as_array())
        .into_iter()
        .flatten()
        .find_map(find_html)
}

/// Summarize a `format=full` message.
pub fn email_record(message: &serde_json::Value) -> EmailRecord {
    let payload = message
        .get("payload")
        .unwrap_or(&serde_json::Value::Null);
    let labels: Vec<&str> = message
        .get("labelIds")
        .and_then(|l| l.as_array())
        .map(|l| l.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    EmailRecord {
        id: message
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        sender: header(payload, "From").unwrap_or_default().to_string(),
        subject: header(payload, "Subject").unwrap_or_default().to_string(),
        time: header(payload, "Date").unwrap_or_default().to_string(),
        label: labels.join(", "),
        unread: labels.contains(&"UNREAD"),
        email: find_html(payload)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| NO_HTML.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::mime::encode_base64url;

    fn data(s: &str) -> String {
        encode_base64url(s.as_bytes())
    }

    #[test]
    fn query_parts_in_order() {
        assert_eq!(
            build_query(Some("INBOX"), true, Some("Meeting"), Some("boss@example.com")),
            "label:INBOX is:unread subject:\"Meeting\" from:boss@example.com"
        );
        assert_eq!(build_query(None, true, None, None), "is:unread");
        assert_eq!(build_query(None, false, None, None), "");
    }

    #[test]
    fn record_from_multipart_message() {
        let msg = serde_json::json!({
            "id": "m1",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "Ann <ann@example.com>"},
                    {"name": "subject", "value": "Hello"},
                    {"name": "Date", "value": "Mon, 3 Feb 2025 10:00:00 +0100"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": data("plain")}},
                            {"mimeType": "text/html", "body": {"data": data("<b>hi</b>")}}
                        ]
                    },
                    {
                        "mimeType": "text/html",
                        "filename": "att.html",
                        "body": {"attachmentId": "x"}
                    }
                ]
            }
        });
        let r = email_record(&msg);
        assert_eq!(r.id, "m1");
        assert_eq!(r.sender, "Ann <ann@example.com>");
        assert_eq!(r.subject, "Hello");
        assert_eq!(r.time, "Mon, 3 Feb 2025 10:00:00 +0100");
        assert_eq!(r.label, "INBOX, UNREAD");
        assert!(r.unread);
        assert_eq!(r.email, "<b>hi</b>");
    }

    #[test]
    fn attachments_are_skipped() {
        let msg = serde_json::json!({
            "id": "m2",
            "labelIds": ["INBOX"],
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {
                        "mimeType": "text/html",
                        "headers": [{"name": "Content-Disposition", "value": "attachment; filename=x.html"}],
                        "body": {"data": data("<i>attached</i>")}
                    }
                ]
            }
        });
        let r = email_record(&msg);
        assert!(!r.unread);
        assert_eq!(r.email, NO_HTML);
        assert_eq!(r.sender, "");
    }

    #[test]
    fn single_part_html() {
        let msg = serde_json::json!({
            "id": "m3",
            "payload": {"mimeType": "text/html", "body": {"data": data("<p>x</p>")}}
        });
        assert_eq!(email_record(&msg).email, "<p>x</p>");
        assert_eq!(email_record(&msg).label, "");
    }
}
