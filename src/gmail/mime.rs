//! Just enough MIME for reading Gmail headers and writing single-part replies.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Decode base64url as used by the Gmail API (padding optional).
pub fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    let trimmed: String = data
        .trim_end_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    URL_SAFE_NO_PAD.decode(trimmed).ok()
}

pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode RFC 2047 encoded words (`=?charset?B|Q?text?=`) in a header value.
///
/// Whitespace between adjacent encoded words is dropped. Supported charsets
/// are UTF-8, US-ASCII and ISO-8859-1; any word that cannot be decoded makes
/// the whole value come back unchanged.
pub fn decode_mime_header(value: &str) -> String {
    decode_encoded_words(value).unwrap_or_else(|| value.to_string())
}

fn decode_encoded_words(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut pending_ws = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        if let Some(start) = rest.find("=?") {
            let (before, from_marker) = rest.split_at(start);
            if let Some((decoded, consumed)) = parse_encoded_word(from_marker)? {
                let only_ws = before.chars().all(char::is_whitespace);
                if !(last_was_word && only_ws) {
                    out.push_str(&pending_ws);
                    out.push_str(before);
                }
                pending_ws.clear();
                out.push_str(&decoded);
                rest = &from_marker[consumed..];
                last_was_word = true;

                // Hold trailing whitespace until we know what follows it.
                let ws_len = rest.len() - rest.trim_start().len();
                pending_ws.push_str(&rest[..ws_len]);
                rest = &rest[ws_len..];
                continue;
            }
            out.push_str(&pending_ws);
            pending_ws.clear();
            out.push_str(before);
            out.push_str("=?");
            rest = &from_marker[2..];
            last_was_word = false;
        } else {
            out.push_str(&pending_ws);
            pending_ws.clear();
            out.push_str(rest);
            rest = "";
        }
    }
    out.push_str(&pending_ws);
    Some(out)
}

/// Parse one encoded word at the start of `s`, returning the decoded text
/// and the number of bytes consumed.
///
/// `None` means a well-formed word failed to decode; `Some(None)` means `s`
/// does not start with an encoded word.
fn parse_encoded_word(s: &str) -> Option<Option<(String, usize)>> {
    let body = &s[2..];
    let mut fields = body.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(tail)) = (fields.next(), fields.next(), fields.next())
    else {
        return Some(None);
    };
    let Some(end) = tail.find("?=") else {
        return Some(None);
    };
    let text = &tail[..end];
    if charset.is_empty() || text.contains(char::is_whitespace) {
        return Some(None);
    }
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => STANDARD
            .decode(text)
            .or_else(|_| STANDARD_NO_PAD.decode(text.trim_end_matches('=')))
            .ok()?,
        "Q" => decode_q(text)?,
        _ => return Some(None),
    };

    // Strip an RFC 2231 language suffix, e.g. `utf-8*en`.
    let charset = charset.split('*').next().unwrap_or(charset);
    let decoded = match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8(bytes).ok()?,
        "iso-8859-1" | "latin1" | "latin-1" => bytes.iter().map(|&b| b as char).collect(),
        _ => return None,
    };
    Some(Some((decoded, consumed)))
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = text.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(out)
}

/// Encode a header value as a UTF-8 `B` encoded word when it is not plain ASCII.
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

const ADDRESS_HEADERS: [&str; 5] = ["From", "To", "Cc", "Bcc", "Reply-To"];

/// Encode an address list, keeping each `<addr-spec>` in plain ASCII and
/// encoding only non-ASCII display names.
pub fn encode_address_header(value: &str) -> String {
    split_mailboxes(value)
        .into_iter()
        .map(|mailbox| {
            let mailbox = mailbox.trim();
            match mailbox.rfind('<') {
                Some(open) if mailbox.ends_with('>') && !mailbox.is_ascii() => {
                    let name = mailbox[..open].trim().trim_matches('"');
                    let addr = &mailbox[open..];
                    if name.is_empty() {
                        addr.to_string()
                    } else {
                        format!("{} {}", encode_header(name), addr)
                    }
                }
                _ => mailbox.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split on commas outside quoted display names and angle brackets.
fn split_mailboxes(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut angle = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// A single-part outgoing message.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub headers: Vec<(String, String)>,
    /// `html` or `plain`.
    pub subtype: &'static str,
    pub body: String,
}

impl OutgoingMessage {
    pub fn html(body: String) -> Self {
        Self {
            headers: Vec::new(),
            subtype: "html",
            body,
        }
    }

    pub fn plain(body: String) -> Self {
        Self {
            headers: Vec::new(),
            subtype: "plain",
            body,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Render as RFC 822 text with a base64 body.
    pub fn to_rfc822(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Content-Type: text/{}; charset=\"utf-8\"\r\n",
            self.subtype
        ));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        for (name, value) in &self.headers {
            let encoded = if ADDRESS_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                encode_address_header(value)
            } else {
                encode_header(value)
            };
            out.push_str(&format!("{}: {}\r\n", name, encoded));
        }
        out.push_str("\r\n");

        let encoded = STANDARD.encode(self.body.as_bytes());
        for line in encoded.as_bytes().chunks(76) {
            out.push_str(&String::from_utf8_lossy(line));
            out.push_str("\r\n");
        }
        out
    }

    /// The `raw` field expected by `messages.send` and `drafts.create`.
    pub fn to_raw(&self) -> String {
        encode_base64url(self.to_rfc822().as_bytes())
    }
}
