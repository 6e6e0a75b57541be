use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// A conversation rolled up for list views.
///
/// Summaries are derived from message rows at query time; they carry the
/// earliest subject, the latest snippet, and aggregate counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Conversation id shared by every member message.
    pub thread_id: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Subject of the earliest message, the conversation's title.
    pub subject: String,
    /// Snippet of the most recent message.
    pub snippet: String,
    /// Distinct sender addresses across the conversation.
    pub participants: Vec<String>,
    /// Number of live messages.
    pub message_count: u32,
    /// Number of unread messages.
    pub unread_count: u32,
    /// Whether any member message is starred.
    pub is_starred: bool,
    /// Arrival of the earliest message.
    pub first_date: DateTime<Utc>,
    /// Arrival of the most recent message.
    pub last_date: DateTime<Utc>,
}

impl ThreadSummary {
    /// Whether the conversation still has unread messages.
    #[must_use]
    pub const fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}
