//! Draft assembly for composing, replying, and sending.

use std::hash::{Hash, Hasher};

use chrono::Utc;
use maildesk_transport::OutgoingMessage;

use crate::account::{Account, AccountId};
use crate::error::{Error, Result};
use crate::message::{Message, MessageId, clean_message_id, normalize_subject, parse_address};

/// A message being written: the input to draft save and send.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Account the message is written from.
    pub account_id: AccountId,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body_text: String,
    /// HTML body.
    pub body_html: Option<String>,
    /// Message id of the message this one replies to.
    pub in_reply_to: Option<String>,
    /// References chain carried over from the replied-to message.
    pub references: Vec<String>,
    /// Stored draft this save or send supersedes.
    pub draft_id: Option<MessageId>,
}

impl MessageDraft {
    /// Start an empty draft for an account.
    #[must_use]
    pub const fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            to: Vec::new(),
            cc: Vec::new(),
            subject: String::new(),
            body_text: String::new(),
            body_html: None,
            in_reply_to: None,
            references: Vec::new(),
            draft_id: None,
        }
    }

    /// Start a reply: recipients and correlation headers come from the
    /// parent, so the reply lands in the same conversation.
    #[must_use]
    pub fn reply_to(account_id: AccountId, parent: &Message) -> Self {
        let mut references = parent.references.clone();
        if !references.contains(&parent.message_id) {
            references.push(parent.message_id.clone());
        }
        let subject = if parent.subject.to_lowercase().starts_with("re:") {
            parent.subject.clone()
        } else {
            format!("Re: {}", parent.subject)
        };
        Self {
            to: vec![parent.from_email.clone()],
            subject,
            in_reply_to: Some(parent.message_id.clone()),
            references,
            ..Self::new(account_id)
        }
    }

    /// Add a primary recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Add a carbon-copy recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Set the subject line.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    #[must_use]
    pub fn body_text(mut self, body: impl Into<String>) -> Self {
        self.body_text = body.into();
        self
    }

    /// Set the HTML body.
    #[must_use]
    pub fn body_html(mut self, body: impl Into<String>) -> Self {
        self.body_html = Some(body.into());
        self
    }

    pub(crate) fn validate_for_send(&self) -> Result<()> {
        if self.to.is_empty() && self.cc.is_empty() {
            return Err(Error::Validation("message has no recipients".into()));
        }
        Ok(())
    }

    pub(crate) fn to_outgoing(&self, account: &Account) -> OutgoingMessage {
        OutgoingMessage {
            from: account.email.clone(),
            to: self.to.clone(),
            cc: self.cc.clone(),
            subject: self.subject.clone(),
            body_text: if self.body_text.is_empty() {
                None
            } else {
                Some(self.body_text.clone())
            },
            body_html: self.body_html.clone(),
            in_reply_to: self.in_reply_to.clone(),
            references: self.references.clone(),
        }
    }

    /// Build the stored form of this draft under the given message id.
    pub(crate) fn to_message(&self, account: &Account, message_id: String) -> Message {
        let mut message = Message::new(
            self.account_id,
            message_id,
            account.email.to_lowercase(),
            self.subject.clone(),
            Utc::now(),
        );
        message.from_name = if account.name.trim().is_empty() {
            None
        } else {
            Some(account.name.clone())
        };
        message.to_emails = self.to.iter().map(|a| parse_address(a).1).collect();
        message.cc_emails = self.cc.iter().map(|a| parse_address(a).1).collect();
        message.in_reply_to = self
            .in_reply_to
            .as_deref()
            .map(clean_message_id)
            .filter(|id| !id.is_empty());
        message.references = self
            .references
            .iter()
            .map(|id| clean_message_id(id))
            .filter(|id| !id.is_empty())
            .collect();
        message.normalized_subject = normalize_subject(&self.subject);
        // Own mail never counts as unread.
        message.flags.is_read = true;
        message.snippet = self.body_text.chars().take(160).collect::<String>();
        message.body_text = if self.body_text.is_empty() {
            None
        } else {
            Some(self.body_text.clone())
        };
        message.body_html = self.body_html.clone();
        message
    }

    /// Locally generated message id in the provider style.
    pub(crate) fn local_message_id(&self) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.account_id.0.hash(&mut hasher);
        self.subject.hash(&mut hasher);
        self.to.hash(&mut hasher);
        Utc::now().timestamp_micros().hash(&mut hasher);
        format!("maildesk-{:016x}@local", hasher.finish())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account() -> Account {
        let mut account = Account::with_email("studio@lenswork.example");
        account.name = "Lenswork Studio".into();
        account
    }

    fn parent() -> Message {
        let mut parent = Message::new(
            AccountId::new(1),
            "quote@client",
            "anna@client.example",
            "Wedding quote",
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
        );
        parent.references = vec!["intro@client".into()];
        parent
    }

    #[test]
    fn reply_carries_the_correlation_chain() {
        let draft = MessageDraft::reply_to(AccountId::new(1), &parent());
        assert_eq!(draft.to, vec!["anna@client.example"]);
        assert_eq!(draft.subject, "Re: Wedding quote");
        assert_eq!(draft.in_reply_to.as_deref(), Some("quote@client"));
        assert_eq!(draft.references, vec!["intro@client", "quote@client"]);
    }

    #[test]
    fn reply_subject_is_not_stacked() {
        let mut parent = parent();
        parent.subject = "Re: Wedding quote".into();
        let draft = MessageDraft::reply_to(AccountId::new(1), &parent);
        assert_eq!(draft.subject, "Re: Wedding quote");
    }

    #[test]
    fn send_requires_a_recipient() {
        let draft = MessageDraft::new(AccountId::new(1)).subject("hello");
        assert!(matches!(
            draft.validate_for_send(),
            Err(Error::Validation(_))
        ));

        let draft = draft.to("anna@client.example");
        assert!(draft.validate_for_send().is_ok());
    }

    #[test]
    fn stored_form_is_normalized() {
        let draft = MessageDraft::new(AccountId::new(1))
            .to("Anna Karlsson <Anna@Client.example>")
            .subject("Re: Wedding quote")
            .body_text("Hi Anna, attached is the final quote.");

        let message = draft.to_message(&account(), "reply@local".into());
        assert_eq!(message.from_email, "studio@lenswork.example");
        assert_eq!(message.from_name.as_deref(), Some("Lenswork Studio"));
        assert_eq!(message.to_emails, vec!["anna@client.example"]);
        assert_eq!(message.normalized_subject, "wedding quote");
        assert!(message.snippet.starts_with("Hi Anna"));
    }

    #[test]
    fn outgoing_form_keeps_typed_recipients() {
        let draft = MessageDraft::new(AccountId::new(1))
            .to("Anna Karlsson <anna@client.example>")
            .subject("Quote")
            .body_text("body");
        let outgoing = draft.to_outgoing(&account());
        assert_eq!(outgoing.from, "studio@lenswork.example");
        assert_eq!(outgoing.to, vec!["Anna Karlsson <anna@client.example>"]);
        assert_eq!(outgoing.body_text.as_deref(), Some("body"));
    }

    #[test]
    fn local_ids_have_the_provider_shape() {
        let draft = MessageDraft::new(AccountId::new(1)).subject("Quote");
        let id = draft.local_message_id();
        assert!(id.starts_with("maildesk-"));
        assert!(id.ends_with("@local"));
    }
}
