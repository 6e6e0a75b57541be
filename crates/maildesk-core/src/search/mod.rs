//! Declarative message filtering.
//!
//! A [`MessageFilter`] names the predicates; the repository composes them
//! into one SQL query. Every provided predicate is ANDed, omitted fields are
//! unconstrained, and free text matches case-insensitive substrings across
//! subject, body, and participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::account::AccountId;
use crate::folder::FolderId;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    /// Newest first (the inbox default).
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
    /// Subject A-Z.
    SubjectAsc,
    /// Sender address A-Z.
    SenderAsc,
}

/// A composable message query.
///
/// All predicates are combined with AND. Soft-deleted messages are excluded
/// unless [`MessageFilter::include_deleted`] is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageFilter {
    /// Restrict to one account.
    pub account_id: Option<AccountId>,
    /// Restrict to one folder.
    pub folder_id: Option<FolderId>,
    /// Restrict to one conversation.
    pub thread_id: Option<String>,
    /// Only unread messages.
    pub unread_only: bool,
    /// Only starred messages.
    pub starred_only: bool,
    /// Only flagged messages.
    pub flagged_only: bool,
    /// Messages carrying at least one of these labels.
    pub labels_any: Vec<String>,
    /// Exact sender address (case-insensitive).
    pub from_email: Option<String>,
    /// Exact assignee.
    pub assigned_to: Option<String>,
    /// Received at or after this instant.
    pub date_from: Option<DateTime<Utc>>,
    /// Received strictly before this instant.
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring over subject, body, and participants.
    pub text: Option<String>,
    /// Include soft-deleted messages.
    pub include_deleted: bool,
    /// Sort order.
    pub sort: SortKey,
    /// Page size; `None` returns everything.
    pub limit: Option<u32>,
    /// Rows to skip. Past the end yields an empty page.
    pub offset: u32,
}

impl MessageFilter {
    /// Filter scoped to one account.
    #[must_use]
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    /// Filter scoped to one folder.
    #[must_use]
    pub fn for_folder(account_id: AccountId, folder_id: FolderId) -> Self {
        Self {
            account_id: Some(account_id),
            folder_id: Some(folder_id),
            ..Self::default()
        }
    }

    /// Keep only unread messages.
    #[must_use]
    pub const fn unread(mut self) -> Self {
        self.unread_only = true;
        self
    }

    /// Keep only starred messages.
    #[must_use]
    pub const fn starred(mut self) -> Self {
        self.starred_only = true;
        self
    }

    /// Keep messages carrying at least one of the labels.
    #[must_use]
    pub fn with_any_label(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels_any = labels.into_iter().collect();
        self
    }

    /// Add a free-text predicate.
    #[must_use]
    pub fn matching(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Page the results.
    #[must_use]
    pub const fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Append `WHERE …` for every provided predicate.
pub(crate) fn push_predicates(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MessageFilter) {
    builder.push(" WHERE 1=1");

    if !filter.include_deleted {
        builder.push(" AND is_deleted = 0");
    }
    if let Some(account_id) = filter.account_id {
        builder.push(" AND account_id = ").push_bind(account_id.0);
    }
    if let Some(folder_id) = filter.folder_id {
        builder.push(" AND folder_id = ").push_bind(folder_id.0);
    }
    if let Some(thread_id) = &filter.thread_id {
        builder.push(" AND thread_id = ").push_bind(thread_id.clone());
    }
    if filter.unread_only {
        builder.push(" AND is_read = 0");
    }
    if filter.starred_only {
        builder.push(" AND is_starred = 1");
    }
    if filter.flagged_only {
        builder.push(" AND is_flagged = 1");
    }
    if !filter.labels_any.is_empty() {
        builder.push(" AND EXISTS (SELECT 1 FROM json_each(messages.labels) WHERE json_each.value IN (");
        let mut separated = builder.separated(", ");
        for label in &filter.labels_any {
            separated.push_bind(label.clone());
        }
        builder.push("))");
    }
    if let Some(from_email) = &filter.from_email {
        builder
            .push(" AND from_email = lower(")
            .push_bind(from_email.clone())
            .push(")");
    }
    if let Some(assigned_to) = &filter.assigned_to {
        builder.push(" AND assigned_to = ").push_bind(assigned_to.clone());
    }
    if let Some(date_from) = filter.date_from {
        builder
            .push(" AND date_received >= ")
            .push_bind(date_from.to_rfc3339());
    }
    if let Some(date_to) = filter.date_to {
        builder
            .push(" AND date_received < ")
            .push_bind(date_to.to_rfc3339());
    }
    if let Some(text) = &filter.text {
        builder.push(" AND (");
        let mut first = true;
        for column in [
            "subject",
            "COALESCE(body_text, '')",
            "snippet",
            "from_email",
            "COALESCE(from_name, '')",
            "to_emails",
            "cc_emails",
        ] {
            if !first {
                builder.push(" OR ");
            }
            first = false;
            builder
                .push(format!("instr(lower({column}), lower("))
                .push_bind(text.clone())
                .push(")) > 0");
        }
        builder.push(")");
    }
}

/// Append the `ORDER BY` clause. The id tiebreak keeps pagination stable.
pub(crate) fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, sort: SortKey) {
    match sort {
        SortKey::DateDesc => builder.push(" ORDER BY date_received DESC, id DESC"),
        SortKey::DateAsc => builder.push(" ORDER BY date_received ASC, id ASC"),
        SortKey::SubjectAsc => builder.push(" ORDER BY lower(subject) ASC, id ASC"),
        SortKey::SenderAsc => builder.push(" ORDER BY from_email ASC, id ASC"),
    };
}

/// Append `LIMIT`/`OFFSET`. `SQLite` needs a LIMIT for OFFSET to apply;
/// `-1` means unlimited.
pub(crate) fn push_page(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MessageFilter) {
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
        builder.push(" OFFSET ").push_bind(i64::from(filter.offset));
    } else if filter.offset > 0 {
        builder.push(" LIMIT -1 OFFSET ").push_bind(i64::from(filter.offset));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rendered(filter: &MessageFilter) -> String {
        let mut builder = QueryBuilder::new("SELECT id FROM messages");
        push_predicates(&mut builder, filter);
        push_order(&mut builder, filter.sort);
        push_page(&mut builder, filter);
        builder.sql().to_string()
    }

    #[test]
    fn empty_filter_only_excludes_deleted() {
        let sql = rendered(&MessageFilter::default());
        assert!(sql.contains("is_deleted = 0"));
        assert!(!sql.contains("account_id"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.ends_with("ORDER BY date_received DESC, id DESC"));
    }

    #[test]
    fn include_deleted_drops_the_guard() {
        let filter = MessageFilter {
            include_deleted: true,
            ..MessageFilter::default()
        };
        assert!(!rendered(&filter).contains("is_deleted"));
    }

    #[test]
    fn predicates_are_anded() {
        let filter = MessageFilter::for_account(AccountId::new(3))
            .unread()
            .matching("invoice")
            .page(25, 50);
        let sql = rendered(&filter);
        assert!(sql.contains("account_id ="));
        assert!(sql.contains("is_read = 0"));
        assert!(sql.contains("instr(lower(subject), lower("));
        assert!(sql.contains("LIMIT"));
        assert!(sql.contains("OFFSET"));
    }

    #[test]
    fn label_overlap_uses_json_each() {
        let filter =
            MessageFilter::default().with_any_label(["vip".to_string(), "billing".to_string()]);
        let sql = rendered(&filter);
        assert!(sql.contains("json_each(messages.labels)"));
    }

    #[test]
    fn sort_keys_render() {
        for (sort, fragment) in [
            (SortKey::DateAsc, "date_received ASC"),
            (SortKey::SubjectAsc, "lower(subject) ASC"),
            (SortKey::SenderAsc, "from_email ASC"),
        ] {
            let filter = MessageFilter {
                sort,
                ..MessageFilter::default()
            };
            assert!(rendered(&filter).contains(fragment));
        }
    }

    #[test]
    fn offset_without_limit_still_pages() {
        let filter = MessageFilter {
            offset: 10,
            ..MessageFilter::default()
        };
        assert!(rendered(&filter).contains("LIMIT -1 OFFSET"));
    }
}
