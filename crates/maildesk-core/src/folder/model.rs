//! Folder model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Unique identifier for a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub i64);

impl FolderId {
    /// Create a new folder ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known folder roles plus a custom bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FolderType {
    /// Incoming mail.
    Inbox,
    /// Sent mail.
    Sent,
    /// Unsent drafts.
    Drafts,
    /// Deleted mail.
    Trash,
    /// Junk mail.
    Spam,
    /// Archived mail.
    Archive,
    /// Anything else.
    #[default]
    Custom,
}

impl FolderType {
    /// Storage identifier for the folder type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Trash => "trash",
            Self::Spam => "spam",
            Self::Archive => "archive",
            Self::Custom => "custom",
        }
    }

    /// Parse a storage identifier; unknown values map to `Custom`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" => Self::Drafts,
            "trash" => Self::Trash,
            "spam" => Self::Spam,
            "archive" => Self::Archive,
            _ => Self::Custom,
        }
    }

    /// Guess the role from a server-reported folder name.
    #[must_use]
    pub fn detect(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "inbox" => Self::Inbox,
            "sent" | "sent items" | "sent mail" | "sent messages" => Self::Sent,
            "drafts" | "draft" => Self::Drafts,
            "trash" | "deleted" | "deleted items" | "bin" => Self::Trash,
            "spam" | "junk" | "junk mail" | "junk e-mail" => Self::Spam,
            "archive" | "archives" | "all mail" => Self::Archive,
            _ => Self::Custom,
        }
    }

    /// Display ordering weight (inbox first, custom last).
    #[must_use]
    pub const fn sort_weight(&self) -> u8 {
        match self {
            Self::Inbox => 0,
            Self::Drafts => 1,
            Self::Sent => 2,
            Self::Archive => 3,
            Self::Spam => 4,
            Self::Trash => 5,
            Self::Custom => 6,
        }
    }
}

/// A mail folder within an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier (None for unsaved folders).
    pub id: Option<FolderId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Optional parent folder for nesting.
    pub parent_id: Option<FolderId>,
    /// Identifier the remote server uses for this folder.
    pub remote_id: String,
    /// Display name.
    pub name: String,
    /// Detected role.
    pub folder_type: FolderType,
    /// Whether sync passes fetch this folder.
    pub sync_enabled: bool,
    /// Cached message count (derived).
    pub total_count: u32,
    /// Cached unread count (derived).
    pub unread_count: u32,
    /// Sync watermark: only messages newer than this are fetched.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

impl Folder {
    /// Create a folder with the role detected from its name.
    #[must_use]
    pub fn new(account_id: AccountId, remote_id: &str, name: &str) -> Self {
        Self {
            id: None,
            account_id,
            parent_id: None,
            remote_id: remote_id.to_string(),
            name: name.to_string(),
            folder_type: FolderType::detect(name),
            sync_enabled: true,
            total_count: 0,
            unread_count: 0,
            last_synced_at: None,
            is_deleted: false,
        }
    }
}
