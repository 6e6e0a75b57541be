use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::account::AccountId;
use crate::error::Result;
use crate::folder::FolderId;
use crate::store::parse_utc_opt;
use crate::thread::model::ThreadSummary;

/// Read-side queries over conversations.
///
/// Threads have no table of their own; summaries are aggregated from the
/// message rows sharing a `thread_id`.
pub struct ThreadRepository {
    pool: SqlitePool,
}

impl ThreadRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists conversations newest-activity-first, optionally scoped to one
    /// folder.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list(
        &self,
        account_id: AccountId,
        folder_id: Option<FolderId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadSummary>> {
        let mut builder = summary_builder(account_id);
        if let Some(folder_id) = folder_id {
            builder.push(" AND m.folder_id = ").push_bind(folder_id.0);
        }
        builder.push(" GROUP BY m.thread_id ORDER BY last_date DESC");
        builder.push(" LIMIT ").push_bind(i64::from(limit));
        builder.push(" OFFSET ").push_bind(i64::from(offset));
        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_summary).collect())
    }

    /// Looks up one conversation's summary.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(
        &self,
        account_id: AccountId,
        thread_id: &str,
    ) -> Result<Option<ThreadSummary>> {
        let mut builder = summary_builder(account_id);
        builder.push(" AND m.thread_id = ").push_bind(thread_id.to_string());
        builder.push(" GROUP BY m.thread_id");
        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_summary))
    }
}

fn summary_builder(account_id: AccountId) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(
        "SELECT m.account_id, m.thread_id, \
                COUNT(*) AS message_count, \
                SUM(CASE WHEN m.is_read = 0 THEN 1 ELSE 0 END) AS unread_count, \
                MAX(m.is_starred) AS any_starred, \
                MIN(m.date_received) AS first_date, \
                MAX(m.date_received) AS last_date, \
                group_concat(DISTINCT m.from_email) AS senders, \
                (SELECT f.subject FROM messages f \
                  WHERE f.account_id = m.account_id AND f.thread_id = m.thread_id \
                    AND f.is_deleted = 0 \
                  ORDER BY f.date_received ASC, f.id ASC LIMIT 1) AS first_subject, \
                (SELECT l.snippet FROM messages l \
                  WHERE l.account_id = m.account_id AND l.thread_id = m.thread_id \
                    AND l.is_deleted = 0 \
                  ORDER BY l.date_received DESC, l.id DESC LIMIT 1) AS last_snippet \
         FROM messages m WHERE m.is_deleted = 0 AND m.account_id = ",
    );
    builder.push_bind(account_id.0);
    builder
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_summary(row: &SqliteRow) -> ThreadSummary {
    let senders: Option<String> = row.get("senders");
    ThreadSummary {
        thread_id: row.get("thread_id"),
        account_id: AccountId::new(row.get("account_id")),
        subject: row
            .get::<Option<String>, _>("first_subject")
            .unwrap_or_default(),
        snippet: row
            .get::<Option<String>, _>("last_snippet")
            .unwrap_or_default(),
        participants: senders
            .unwrap_or_default()
            .split(',')
            .filter(|sender| !sender.is_empty())
            .map(ToString::to_string)
            .collect(),
        message_count: row.get::<i64, _>("message_count") as u32,
        unread_count: row.get::<i64, _>("unread_count") as u32,
        is_starred: row.get::<i64, _>("any_starred") != 0,
        first_date: parse_utc_opt(row.get("first_date")).unwrap_or(DateTime::UNIX_EPOCH),
        last_date: parse_utc_opt(row.get("last_date")).unwrap_or(DateTime::UNIX_EPOCH),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::store::Store;
    use chrono::{TimeZone, Utc};

    async fn seed(store: &Store, account_id: AccountId) {
        let repo = store.messages();
        let mut opener = Message::new(
            account_id,
            "<shoot-1@example.com>",
            "bride@example.com",
            "Wedding timeline",
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        );
        opener.snippet = "Can we start at noon?".to_string();
        repo.create_local(&mut opener).await.unwrap();

        let mut reply = Message::new(
            account_id,
            "<shoot-2@example.com>",
            "studio@example.com",
            "Re: Wedding timeline",
            Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
        );
        reply.thread_id = "<shoot-1@example.com>".to_string();
        reply.snippet = "Noon works.".to_string();
        reply.flags.is_read = true;
        repo.create_local(&mut reply).await.unwrap();

        let mut single = Message::new(
            account_id,
            "<invoice-1@example.com>",
            "vendor@example.com",
            "Invoice 44",
            Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap(),
        );
        single.flags.is_starred = true;
        repo.create_local(&mut single).await.unwrap();
    }

    #[tokio::test]
    async fn list_rolls_up_conversations() {
        let store = Store::in_memory().await.unwrap();
        let account_id = AccountId::new(1);
        seed(&store, account_id).await;

        let threads = store.threads().list(account_id, None, 50, 0).await.unwrap();
        assert_eq!(threads.len(), 2);

        // Newest activity first: the invoice arrived last.
        assert_eq!(threads[0].thread_id, "<invoice-1@example.com>");
        assert!(threads[0].is_starred);

        let wedding = &threads[1];
        assert_eq!(wedding.message_count, 2);
        assert_eq!(wedding.unread_count, 1);
        assert_eq!(wedding.subject, "Wedding timeline");
        assert_eq!(wedding.snippet, "Noon works.");
        assert!(wedding.participants.contains(&"bride@example.com".to_string()));
        assert!(wedding.participants.contains(&"studio@example.com".to_string()));
        assert!(wedding.first_date < wedding.last_date);
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_thread() {
        let store = Store::in_memory().await.unwrap();
        let account_id = AccountId::new(1);
        seed(&store, account_id).await;

        let summary = store
            .threads()
            .get(account_id, "<shoot-1@example.com>")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.message_count, 2);
        assert!(store
            .threads()
            .get(account_id, "<missing@example.com>")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pagination_past_the_end_is_empty() {
        let store = Store::in_memory().await.unwrap();
        let account_id = AccountId::new(1);
        seed(&store, account_id).await;

        let page = store.threads().list(account_id, None, 10, 50).await.unwrap();
        assert!(page.is_empty());
    }
}
