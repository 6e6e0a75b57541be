//! Message normalization.
//!
//! Converts transport [`RawMessage`]s into canonical [`Message`]s: header ids
//! cleaned, addresses parsed and lower-cased, subjects stripped of
//! reply/forward prefixes, and a short plain-text snippet derived from the
//! body.

use std::hash::{Hash, Hasher};

use maildesk_transport::RawMessage;

use super::model::{Attachment, Message, MessageFlags};
use crate::account::AccountId;

/// Maximum snippet length in characters.
const SNIPPET_MAX: usize = 160;

/// Convert a raw fetched message into its canonical stored form.
///
/// The thread id starts as the message's own id (a singleton thread); the
/// thread grouper rewrites it when a correlation is found.
#[must_use]
pub fn normalize(account_id: AccountId, raw: &RawMessage) -> Message {
    let cleaned = clean_message_id(&raw.message_id);
    let message_id = if cleaned.is_empty() {
        synthetic_message_id(raw)
    } else {
        cleaned
    };

    let (from_name, from_email) = parse_address(&raw.from);

    let mut message = Message::new(
        account_id,
        message_id,
        from_email,
        raw.subject.clone(),
        raw.date,
    );
    message.remote_id = Some(raw.remote_id.clone());
    message.from_name = from_name;
    message.to_emails = raw.to.iter().map(|a| parse_address(a).1).collect();
    message.cc_emails = raw.cc.iter().map(|a| parse_address(a).1).collect();
    message.in_reply_to = {
        let cleaned = raw.in_reply_to.as_deref().map(clean_message_id);
        cleaned.filter(|id| !id.is_empty())
    };
    message.references = raw
        .references
        .iter()
        .map(|id| clean_message_id(id))
        .filter(|id| !id.is_empty())
        .collect();
    message.normalized_subject = normalize_subject(&raw.subject);
    message.snippet = derive_snippet(raw.body_text.as_deref(), raw.body_html.as_deref());
    message.body_text = raw.body_text.clone();
    message.body_html = raw.body_html.clone();
    message.flags = MessageFlags {
        is_read: raw.is_read,
        is_starred: raw.is_starred,
        ..MessageFlags::default()
    };
    message.attachments = raw
        .attachments
        .iter()
        .map(|a| Attachment {
            filename: a.filename.clone(),
            mime_type: a.mime_type.clone(),
            size: a.size,
        })
        .collect();
    message
}

/// Strip angle brackets and whitespace from a header message id.
#[must_use]
pub fn clean_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Parse `Name <addr>` into a display name and a lower-cased address.
///
/// Bare addresses yield no name; surrounding quotes on the name are removed.
#[must_use]
pub fn parse_address(input: &str) -> (Option<String>, String) {
    let input = input.trim();
    if let Some(open) = input.rfind('<')
        && let Some(close) = input.rfind('>')
        && close > open
    {
        let email = input[open + 1..close].trim().to_lowercase();
        let name = input[..open].trim().trim_matches('"').trim();
        let name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        return (name, email);
    }
    (None, input.to_lowercase())
}

/// Strip reply/forward prefixes iteratively, collapse whitespace, lower-case.
///
/// `Re: Re: Fwd: Booking` and `booking` normalize to the same string, which
/// is what the thread heuristic compares.
#[must_use]
pub fn normalize_subject(subject: &str) -> String {
    let mut current = subject.trim();
    'outer: loop {
        for prefix in ["re:", "fwd:", "fw:"] {
            if let Some(rest) = strip_prefix_ci(current, prefix) {
                current = rest.trim_start();
                continue 'outer;
            }
        }
        break;
    }
    current
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deduplicate, trim, and sort a label set.
#[must_use]
pub(crate) fn normalize_label_set(labels: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut cleaned: Vec<String> = labels
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

/// Case-insensitive (ASCII) prefix strip.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = s.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return None;
        }
    }
    let rest = chars.next().map_or(s.len(), |(i, _)| i);
    Some(&s[rest..])
}

/// Derive a short plain-text preview, preferring the text body.
fn derive_snippet(body_text: Option<&str>, body_html: Option<&str>) -> String {
    let source = match (body_text, body_html) {
        (Some(text), _) => text.to_string(),
        (None, Some(html)) => strip_html(html),
        (None, None) => return String::new(),
    };
    source
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_MAX)
        .collect()
}

/// Remove tags and decode the handful of entities that matter for previews.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Deterministic message id for messages the provider sent without one.
fn synthetic_message_id(raw: &RawMessage) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    raw.from.hash(&mut hasher);
    raw.subject.hash(&mut hasher);
    raw.date.timestamp_millis().hash(&mut hasher);
    raw.remote_id.hash(&mut hasher);
    format!("maildesk-{:016x}@local", hasher.finish())
}
