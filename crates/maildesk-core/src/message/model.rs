//! Message model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::folder::FolderId;

/// Unique local identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attachment metadata. Content stays on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename as advertised by the sender.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// The mutable boolean state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageFlags {
    /// Message has been read.
    pub is_read: bool,
    /// Message is starred.
    pub is_starred: bool,
    /// Message is flagged for follow-up.
    pub is_flagged: bool,
    /// Message is an unsent draft.
    pub is_draft: bool,
    /// Message was sent from this account.
    pub is_sent: bool,
    /// Message is archived.
    pub is_archived: bool,
    /// Message is junk.
    pub is_spam: bool,
    /// Message is soft-deleted.
    pub is_deleted: bool,
}

impl MessageFlags {
    /// Read the value of one flag.
    #[must_use]
    pub const fn get(&self, kind: FlagKind) -> bool {
        match kind {
            FlagKind::Read => self.is_read,
            FlagKind::Starred => self.is_starred,
            FlagKind::Flagged => self.is_flagged,
            FlagKind::Draft => self.is_draft,
            FlagKind::Sent => self.is_sent,
            FlagKind::Archived => self.is_archived,
            FlagKind::Spam => self.is_spam,
            FlagKind::Deleted => self.is_deleted,
        }
    }

    /// Set the value of one flag.
    pub const fn set(&mut self, kind: FlagKind, value: bool) {
        match kind {
            FlagKind::Read => self.is_read = value,
            FlagKind::Starred => self.is_starred = value,
            FlagKind::Flagged => self.is_flagged = value,
            FlagKind::Draft => self.is_draft = value,
            FlagKind::Sent => self.is_sent = value,
            FlagKind::Archived => self.is_archived = value,
            FlagKind::Spam => self.is_spam = value,
            FlagKind::Deleted => self.is_deleted = value,
        }
    }
}

/// Addressable message flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    /// `is_read`.
    Read,
    /// `is_starred`.
    Starred,
    /// `is_flagged`.
    Flagged,
    /// `is_draft`.
    Draft,
    /// `is_sent`.
    Sent,
    /// `is_archived`.
    Archived,
    /// `is_spam`.
    Spam,
    /// `is_deleted`.
    Deleted,
}

impl FlagKind {
    /// The fixed column name backing this flag.
    #[must_use]
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::Read => "is_read",
            Self::Starred => "is_starred",
            Self::Flagged => "is_flagged",
            Self::Draft => "is_draft",
            Self::Sent => "is_sent",
            Self::Archived => "is_archived",
            Self::Spam => "is_spam",
            Self::Deleted => "is_deleted",
        }
    }
}

/// A normalized, stored email message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique local identifier (None for unsaved messages).
    pub id: Option<MessageId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Containing folder; drafts may have none.
    pub folder_id: Option<FolderId>,
    /// Transport-layer identity, used for idempotent re-fetch.
    pub remote_id: Option<String>,
    /// Provider-issued identity (angle brackets stripped), unique per account.
    pub message_id: String,
    /// Conversation this message belongs to.
    pub thread_id: String,
    /// Cleaned `In-Reply-To` header id.
    pub in_reply_to: Option<String>,
    /// Cleaned `References` header ids, oldest first.
    pub references: Vec<String>,
    /// Sender display name.
    pub from_name: Option<String>,
    /// Sender address, lower-cased.
    pub from_email: String,
    /// `To` addresses, lower-cased.
    pub to_emails: Vec<String>,
    /// `Cc` addresses, lower-cased.
    pub cc_emails: Vec<String>,
    /// Subject as received.
    pub subject: String,
    /// Subject with reply/forward prefixes stripped, lower-cased.
    pub normalized_subject: String,
    /// Short plain-text preview.
    pub snippet: String,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Receive time.
    pub date_received: DateTime<Utc>,
    /// Mutable boolean state.
    pub flags: MessageFlags,
    /// User labels (set semantics: deduplicated, sorted).
    pub labels: Vec<String>,
    /// Local-only assignee (studio staff member).
    pub assigned_to: Option<String>,
    /// Attachment metadata.
    pub attachments: Vec<Attachment>,
    /// Last local flag edit; drives reconciliation against remote state.
    pub flags_changed_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a minimal message; the thread starts as a singleton.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        message_id: impl Into<String>,
        from_email: impl Into<String>,
        subject: impl Into<String>,
        date_received: DateTime<Utc>,
    ) -> Self {
        let message_id = message_id.into();
        Self {
            id: None,
            account_id,
            folder_id: None,
            remote_id: None,
            thread_id: message_id.clone(),
            message_id,
            in_reply_to: None,
            references: Vec::new(),
            from_name: None,
            from_email: from_email.into(),
            to_emails: Vec::new(),
            cc_emails: Vec::new(),
            subject: subject.into(),
            normalized_subject: String::new(),
            snippet: String::new(),
            body_text: None,
            body_html: None,
            date_received,
            flags: MessageFlags::default(),
            labels: Vec::new(),
            assigned_to: None,
            attachments: Vec::new(),
            flags_changed_at: None,
        }
    }

    /// Whether the message carries the given label.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// All participating addresses: sender, `To`, and `Cc`.
    #[must_use]
    pub fn participants(&self) -> Vec<&str> {
        let mut all = Vec::with_capacity(1 + self.to_emails.len() + self.cc_emails.len());
        if !self.from_email.is_empty() {
            all.push(self.from_email.as_str());
        }
        all.extend(self.to_emails.iter().map(String::as_str));
        all.extend(self.cc_emails.iter().map(String::as_str));
        all
    }

    /// Every header id that correlates this message to a conversation.
    #[must_use]
    pub fn correlation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.references.iter().map(String::as_str).collect();
        if let Some(reply_to) = self.in_reply_to.as_deref()
            && !ids.contains(&reply_to)
        {
            ids.push(reply_to);
        }
        ids
    }
}
