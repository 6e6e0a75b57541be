//! Wire-facing data types exchanged with a mail server adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// Connection parameters for one direction (fetch or submit) of a mailbox.
///
/// The secret is resolved from the credential store immediately before a
/// session is opened; it is never persisted alongside the host settings.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Secret (password or token) for authentication.
    pub secret: String,
}

/// Outcome of probing a server with the given configuration.
///
/// Connection probes report health as data rather than an error so callers
/// can show the server's own words to the user.
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    /// Whether the probe reached and authenticated against the server.
    pub success: bool,
    /// Human-readable detail (greeting, or the failure reason).
    pub message: String,
}

impl ConnectionHealth {
    /// A successful probe with the given detail.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed probe with the given detail.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A folder as reported by the remote server.
#[derive(Debug, Clone)]
pub struct RemoteFolder {
    /// Stable identifier the server uses for this folder.
    pub remote_id: String,
    /// Display name (last path segment).
    pub name: String,
    /// Whether messages can be fetched from it.
    pub selectable: bool,
}

impl RemoteFolder {
    /// Creates a selectable remote folder.
    #[must_use]
    pub fn new(remote_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            selectable: true,
        }
    }
}

/// Attachment metadata carried by a raw message. Content is not fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAttachment {
    /// Filename as advertised by the sender.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// A message as handed over by the transport, before normalization.
///
/// Header fields are passed through as the server sent them: address fields
/// may be `Name <addr>` or bare addresses, and correlation ids may still be
/// wrapped in angle brackets.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Transport-layer identity, used for idempotent re-fetch.
    pub remote_id: String,
    /// Provider-issued `Message-Id` header value.
    pub message_id: String,
    /// `In-Reply-To` header value, if present.
    pub in_reply_to: Option<String>,
    /// `References` header ids, oldest first.
    pub references: Vec<String>,
    /// `From` header value.
    pub from: String,
    /// `To` header values.
    pub to: Vec<String>,
    /// `Cc` header values.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Delivery timestamp.
    pub date: DateTime<Utc>,
    /// Whether the server reports the message as seen.
    pub is_read: bool,
    /// Whether the server reports the message as starred/flagged.
    pub is_starred: bool,
    /// Plain text body, if fetched.
    pub body_text: Option<String>,
    /// HTML body, if fetched.
    pub body_html: Option<String>,
    /// Attachment metadata.
    pub attachments: Vec<RawAttachment>,
}

impl RawMessage {
    /// Creates a minimal raw message; remaining fields start empty.
    #[must_use]
    pub fn new(
        remote_id: impl Into<String>,
        message_id: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            message_id: message_id.into(),
            in_reply_to: None,
            references: Vec::new(),
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            subject: subject.into(),
            date,
            is_read: false,
            is_starred: false,
            body_text: None,
            body_html: None,
            attachments: Vec::new(),
        }
    }

    /// Sets the `To` recipients.
    #[must_use]
    pub fn with_to(mut self, to: Vec<String>) -> Self {
        self.to = to;
        self
    }

    /// Sets the `In-Reply-To` header.
    #[must_use]
    pub fn with_in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Sets the `References` header ids.
    #[must_use]
    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn with_body_text(mut self, body: impl Into<String>) -> Self {
        self.body_text = Some(body.into());
        self
    }

    /// Marks the message as read on the server.
    #[must_use]
    pub const fn read(mut self) -> Self {
        self.is_read = true;
        self
    }
}

/// A composed message handed to the transport for submission.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// `In-Reply-To` header for replies.
    pub in_reply_to: Option<String>,
    /// `References` header ids.
    pub references: Vec<String>,
}
