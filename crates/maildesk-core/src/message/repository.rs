use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::account::AccountId;
use crate::error::{Error, Result};
use crate::folder::{FolderId, recompute_folder_counts};
use crate::message::model::{Attachment, FlagKind, Message, MessageFlags, MessageId};
use crate::message::normalize::normalize_label_set;
use crate::search::{self, MessageFilter};
use crate::store::{parse_utc, parse_utc_opt};

const MESSAGE_COLUMNS: &str = "id, account_id, folder_id, remote_id, message_id, thread_id, \
     in_reply_to, references_ids, from_name, from_email, to_emails, cc_emails, subject, \
     normalized_subject, snippet, body_text, body_html, date_received, is_read, is_starred, \
     is_flagged, is_draft, is_sent, is_archived, is_spam, is_deleted, labels, assigned_to, \
     attachments, flags_changed_at";

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The message was new for this account.
    Inserted,
    /// An existing row was refreshed in place.
    Updated,
}

/// `SQLite`-backed storage for messages.
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetches a message by id.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_message).transpose()
    }

    /// Fetches a message by its provider `Message-ID` within one account.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn get_by_message_id(
        &self,
        account_id: AccountId,
        message_id: &str,
    ) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await?;
        find_by_message_id(&mut conn, account_id, message_id).await
    }

    /// Stores a locally authored message (draft or sent copy).
    ///
    /// Fills in `message.id` on success.
    ///
    /// # Errors
    /// Returns [`Error::Conflict`] when the account already holds a message
    /// with the same `Message-ID`, or a database error.
    pub async fn create_local(&self, message: &mut Message) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let existing =
            find_by_message_id(&mut conn, message.account_id, &message.message_id).await?;
        if existing.is_some() {
            return Err(Error::Conflict(format!(
                "message '{}' already exists for this account",
                message.message_id
            )));
        }
        insert_message(&mut conn, message).await
    }

    /// Inserts or refreshes a fetched message.
    ///
    /// `watermark` is the folder's sync position when the fetch started.
    /// Remote read/starred state wins unless the local copy was edited after
    /// that instant; labels, assignment, and local-only flags always survive.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn upsert_fetched(
        &self,
        message: &mut Message,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<UpsertOutcome> {
        let mut conn = self.pool.acquire().await?;
        upsert_message(&mut conn, message, watermark).await
    }

    /// Sets a single flag, stamping `flags_changed_at`.
    ///
    /// Setting a flag to its current value is a no-op and does not move the
    /// stamp. Read and deleted transitions refresh the folder counters.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown id, or a database
    /// error.
    pub async fn set_flag(&self, id: MessageId, kind: FlagKind, value: bool) -> Result<()> {
        let message = self
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;
        if message.flags.get(kind) == value {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE messages SET {} = ?, flags_changed_at = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
            kind.column()
        );
        sqlx::query(&sql)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if matches!(kind, FlagKind::Read | FlagKind::Deleted)
            && let Some(folder_id) = message.folder_id
        {
            recompute_folder_counts(&mut *tx, folder_id.0).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Adds labels to a message, returning the stored result.
    ///
    /// Labels are trimmed and deduplicated; adding a label the message
    /// already carries changes nothing.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown id, or a database
    /// error.
    pub async fn add_labels(&self, id: MessageId, labels: &[String]) -> Result<Message> {
        let message = self
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;
        let merged = normalize_label_set(
            message.labels.iter().cloned().chain(labels.iter().cloned()),
        );
        self.write_labels(message, merged).await
    }

    /// Removes labels from a message, returning the stored result.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown id, or a database
    /// error.
    pub async fn remove_labels(&self, id: MessageId, labels: &[String]) -> Result<Message> {
        let message = self
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;
        let dropped = normalize_label_set(labels.iter().cloned());
        let remaining: Vec<String> = message
            .labels
            .iter()
            .filter(|label| !dropped.contains(label))
            .cloned()
            .collect();
        self.write_labels(message, remaining).await
    }

    /// Replaces the label set wholesale.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown id, or a database
    /// error.
    pub async fn set_labels(&self, id: MessageId, labels: &[String]) -> Result<Message> {
        let message = self
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;
        let normalized = normalize_label_set(labels.iter().cloned());
        self.write_labels(message, normalized).await
    }

    async fn write_labels(&self, mut message: Message, labels: Vec<String>) -> Result<Message> {
        if labels == message.labels {
            return Ok(message);
        }
        let id = message.id.ok_or_else(|| {
            Error::MessageNotFound("message has not been stored yet".to_string())
        })?;
        sqlx::query("UPDATE messages SET labels = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(serde_json::to_string(&labels)?)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        message.labels = labels;
        Ok(message)
    }

    /// Assigns the message to a team member, or clears the assignment.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown id, or a database
    /// error.
    pub async fn assign_to(&self, id: MessageId, assignee: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE messages SET assigned_to = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(assignee)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::MessageNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Moves a message to another folder of the same account, keeping both
    /// folders' counters consistent.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] or [`Error::FolderNotFound`] when
    /// either side is unknown, and [`Error::Conflict`] when the target folder
    /// belongs to a different account.
    pub async fn move_to_folder(&self, id: MessageId, target: FolderId) -> Result<()> {
        let message = self
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;
        let folder = sqlx::query("SELECT account_id, is_deleted FROM folders WHERE id = ?")
            .bind(target.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(folder) = folder else {
            return Err(Error::FolderNotFound(target.to_string()));
        };
        if folder.get::<i64, _>("is_deleted") != 0 {
            return Err(Error::FolderNotFound(target.to_string()));
        }
        if folder.get::<i64, _>("account_id") != message.account_id.0 {
            return Err(Error::Conflict(
                "cannot move a message into another account's folder".to_string(),
            ));
        }
        if message.folder_id == Some(target) {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE messages SET folder_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(target.0)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        if let Some(previous) = message.folder_id {
            recompute_folder_counts(&mut *tx, previous.0).await?;
        }
        recompute_folder_counts(&mut *tx, target.0).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Lists a conversation oldest-first.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn list_by_thread(
        &self,
        account_id: AccountId,
        thread_id: &str,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE account_id = ? AND thread_id = ? AND is_deleted = 0 \
             ORDER BY date_received ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.0)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Runs a composed filter query.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn search(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {MESSAGE_COLUMNS} FROM messages"));
        search::push_predicates(&mut builder, filter);
        search::push_order(&mut builder, filter.sort);
        search::push_page(&mut builder, filter);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Counts the messages a filter matches, ignoring pagination.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(&self, filter: &MessageFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages");
        search::push_predicates(&mut builder, filter);
        let total: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

pub(crate) async fn find_by_message_id(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    message_id: &str,
) -> Result<Option<Message>> {
    let sql =
        format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE account_id = ? AND message_id = ?");
    let row = sqlx::query(&sql)
        .bind(account_id.0)
        .bind(message_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_message).transpose()
}

/// Looks up messages whose `Message-ID` appears in `ids`.
pub(crate) async fn find_by_any_message_id(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    ids: &[String],
) -> Result<Vec<Message>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("SELECT {MESSAGE_COLUMNS} FROM messages"));
    builder.push(" WHERE account_id = ").push_bind(account_id.0);
    builder.push(" AND message_id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    builder.push(")");
    let rows = builder.build().fetch_all(&mut *conn).await?;
    rows.iter().map(row_to_message).collect()
}

/// Stored messages whose headers point at `message_id`, covering replies
/// that arrived before the message they answer.
pub(crate) async fn referencing_candidates(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    message_id: &str,
) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages \
         WHERE account_id = ? AND (in_reply_to = ? \
            OR EXISTS (SELECT 1 FROM json_each(messages.references_ids) \
                       WHERE json_each.value = ?))"
    );
    let rows = sqlx::query(&sql)
        .bind(account_id.0)
        .bind(message_id)
        .bind(message_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_message).collect()
}

/// Messages sharing a normalized subject within a time window around
/// `center`, newest first. Blank subjects never match.
pub(crate) async fn subject_candidates(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    normalized_subject: &str,
    center: DateTime<Utc>,
    window: Duration,
) -> Result<Vec<Message>> {
    if normalized_subject.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages \
         WHERE account_id = ? AND normalized_subject = ? \
           AND date_received >= ? AND date_received <= ? \
         ORDER BY date_received DESC, id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(account_id.0)
        .bind(normalized_subject)
        .bind((center - window).to_rfc3339())
        .bind((center + window).to_rfc3339())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_message).collect()
}

/// Moves every message of `from` into `to`, returning how many rows moved.
pub(crate) async fn reassign_thread(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    from: &str,
    to: &str,
) -> Result<u64> {
    if from == to {
        return Ok(0);
    }
    let result = sqlx::query(
        "UPDATE messages SET thread_id = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE account_id = ? AND thread_id = ?",
    )
    .bind(to)
    .bind(account_id.0)
    .bind(from)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Size and earliest arrival of a thread, or `None` when it holds no rows.
pub(crate) async fn thread_extent(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    thread_id: &str,
) -> Result<Option<(u64, DateTime<Utc>)>> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS size, MIN(date_received) AS earliest FROM messages \
         WHERE account_id = ? AND thread_id = ?",
    )
    .bind(account_id.0)
    .bind(thread_id)
    .fetch_one(&mut *conn)
    .await?;
    let size = u64::try_from(row.get::<i64, _>("size")).unwrap_or(0);
    if size == 0 {
        return Ok(None);
    }
    let earliest = parse_utc_opt(row.get("earliest")).unwrap_or(DateTime::UNIX_EPOCH);
    Ok(Some((size, earliest)))
}

pub(crate) async fn upsert_message(
    conn: &mut SqliteConnection,
    message: &mut Message,
    watermark: Option<DateTime<Utc>>,
) -> Result<UpsertOutcome> {
    let existing = find_by_message_id(&mut *conn, message.account_id, &message.message_id).await?;
    let Some(existing) = existing else {
        insert_message(conn, message).await?;
        return Ok(UpsertOutcome::Inserted);
    };

    // Remote read/starred state wins unless the local copy changed after the
    // folder's last sync position.
    let keep_local_flags = existing
        .flags_changed_at
        .is_some_and(|changed| watermark.is_none_or(|mark| changed > mark));
    let mut flags = existing.flags;
    if !keep_local_flags {
        flags.is_read = message.flags.is_read;
        flags.is_starred = message.flags.is_starred;
    }

    let id = existing
        .id
        .ok_or_else(|| Error::MessageNotFound("stored message is missing its id".to_string()))?;
    sqlx::query(
        "UPDATE messages SET folder_id = ?, remote_id = ?, in_reply_to = ?, references_ids = ?, \
             from_name = ?, from_email = ?, to_emails = ?, cc_emails = ?, subject = ?, \
             normalized_subject = ?, snippet = ?, body_text = ?, body_html = ?, \
             date_received = ?, is_read = ?, is_starred = ?, attachments = ?, \
             updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(message.folder_id.map(|folder_id| folder_id.0))
    .bind(message.remote_id.as_deref())
    .bind(message.in_reply_to.as_deref())
    .bind(serde_json::to_string(&message.references)?)
    .bind(message.from_name.as_deref())
    .bind(&message.from_email)
    .bind(serde_json::to_string(&message.to_emails)?)
    .bind(serde_json::to_string(&message.cc_emails)?)
    .bind(&message.subject)
    .bind(&message.normalized_subject)
    .bind(&message.snippet)
    .bind(message.body_text.as_deref())
    .bind(message.body_html.as_deref())
    .bind(message.date_received.to_rfc3339())
    .bind(flags.is_read)
    .bind(flags.is_starred)
    .bind(serde_json::to_string(&message.attachments)?)
    .bind(id.0)
    .execute(&mut *conn)
    .await?;

    message.id = existing.id;
    message.thread_id = existing.thread_id;
    message.flags = flags;
    message.labels = existing.labels;
    message.assigned_to = existing.assigned_to;
    message.flags_changed_at = existing.flags_changed_at;
    Ok(UpsertOutcome::Updated)
}

pub(crate) async fn insert_message(
    conn: &mut SqliteConnection,
    message: &mut Message,
) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO messages (account_id, folder_id, remote_id, message_id, thread_id, \
             in_reply_to, references_ids, from_name, from_email, to_emails, cc_emails, subject, \
             normalized_subject, snippet, body_text, body_html, date_received, is_read, \
             is_starred, is_flagged, is_draft, is_sent, is_archived, is_spam, is_deleted, \
             labels, assigned_to, attachments, flags_changed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
             ?, ?, ?)",
    )
    .bind(message.account_id.0)
    .bind(message.folder_id.map(|folder_id| folder_id.0))
    .bind(message.remote_id.as_deref())
    .bind(&message.message_id)
    .bind(&message.thread_id)
    .bind(message.in_reply_to.as_deref())
    .bind(serde_json::to_string(&message.references)?)
    .bind(message.from_name.as_deref())
    .bind(&message.from_email)
    .bind(serde_json::to_string(&message.to_emails)?)
    .bind(serde_json::to_string(&message.cc_emails)?)
    .bind(&message.subject)
    .bind(&message.normalized_subject)
    .bind(&message.snippet)
    .bind(message.body_text.as_deref())
    .bind(message.body_html.as_deref())
    .bind(message.date_received.to_rfc3339())
    .bind(message.flags.is_read)
    .bind(message.flags.is_starred)
    .bind(message.flags.is_flagged)
    .bind(message.flags.is_draft)
    .bind(message.flags.is_sent)
    .bind(message.flags.is_archived)
    .bind(message.flags.is_spam)
    .bind(message.flags.is_deleted)
    .bind(serde_json::to_string(&message.labels)?)
    .bind(message.assigned_to.as_deref())
    .bind(serde_json::to_string(&message.attachments)?)
    .bind(message.flags_changed_at.map(|at| at.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    message.id = Some(MessageId::new(result.last_insert_rowid()));
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let references: Vec<String> = serde_json::from_str(&row.get::<String, _>("references_ids"))?;
    let to_emails: Vec<String> = serde_json::from_str(&row.get::<String, _>("to_emails"))?;
    let cc_emails: Vec<String> = serde_json::from_str(&row.get::<String, _>("cc_emails"))?;
    let labels: Vec<String> = serde_json::from_str(&row.get::<String, _>("labels"))?;
    let attachments: Vec<Attachment> =
        serde_json::from_str(&row.get::<String, _>("attachments"))?;
    Ok(Message {
        id: Some(MessageId::new(row.get("id"))),
        account_id: AccountId::new(row.get("account_id")),
        folder_id: row.get::<Option<i64>, _>("folder_id").map(FolderId::new),
        remote_id: row.get("remote_id"),
        message_id: row.get("message_id"),
        thread_id: row.get("thread_id"),
        in_reply_to: row.get("in_reply_to"),
        references,
        from_name: row.get("from_name"),
        from_email: row.get("from_email"),
        to_emails,
        cc_emails,
        subject: row.get("subject"),
        normalized_subject: row.get("normalized_subject"),
        snippet: row.get("snippet"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        date_received: parse_utc(&row.get::<String, _>("date_received"))
            .unwrap_or(DateTime::UNIX_EPOCH),
        flags: MessageFlags {
            is_read: row.get::<i64, _>("is_read") != 0,
            is_starred: row.get::<i64, _>("is_starred") != 0,
            is_flagged: row.get::<i64, _>("is_flagged") != 0,
            is_draft: row.get::<i64, _>("is_draft") != 0,
            is_sent: row.get::<i64, _>("is_sent") != 0,
            is_archived: row.get::<i64, _>("is_archived") != 0,
            is_spam: row.get::<i64, _>("is_spam") != 0,
            is_deleted: row.get::<i64, _>("is_deleted") != 0,
        },
        labels,
        assigned_to: row.get("assigned_to"),
        attachments,
        flags_changed_at: parse_utc_opt(row.get("flags_changed_at")),
    })
}
