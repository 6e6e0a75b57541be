//! Local storage layer.
//!
//! One `SQLite` pool shared by every repository so that multi-table writes
//! (folder ingest, moves with count recompute) can run inside a single
//! transaction. Repositories are cheap handles over the pool; get them from
//! [`Store::accounts`] and friends.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::Result;
use crate::account::AccountRepository;
use crate::contacts::ContactRepository;
use crate::folder::FolderRepository;
use crate::message::MessageRepository;
use crate::rules::RuleRepository;
use crate::thread::ThreadRepository;

/// Shared database handle for all Maildesk state.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at the given path.
    ///
    /// Creates all tables and indexes if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn open(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        debug!("Opened store at {database_path}");
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Default database location under the platform data directory.
    ///
    /// Returns `None` when the platform data directory cannot be determined.
    #[must_use]
    pub fn default_database_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("maildesk").join("maildesk.db"))
    }

    /// Account repository over the shared pool.
    #[must_use]
    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.pool.clone())
    }

    /// Folder repository over the shared pool.
    #[must_use]
    pub fn folders(&self) -> FolderRepository {
        FolderRepository::new(self.pool.clone())
    }

    /// Message repository over the shared pool.
    #[must_use]
    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.pool.clone())
    }

    /// Thread summary queries over the shared pool.
    #[must_use]
    pub fn threads(&self) -> ThreadRepository {
        ThreadRepository::new(self.pool.clone())
    }

    /// Rule repository over the shared pool.
    #[must_use]
    pub fn rules(&self) -> RuleRepository {
        RuleRepository::new(self.pool.clone())
    }

    /// Contact repository over the shared pool.
    #[must_use]
    pub fn contacts(&self) -> ContactRepository {
        ContactRepository::new(self.pool.clone())
    }

    /// Raw pool access for multi-repository transactions.
    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                provider TEXT NOT NULL DEFAULT 'imap',
                incoming_host TEXT NOT NULL,
                incoming_port INTEGER NOT NULL,
                incoming_security TEXT NOT NULL,
                outgoing_host TEXT NOT NULL,
                outgoing_port INTEGER NOT NULL,
                outgoing_security TEXT NOT NULL,
                username TEXT NOT NULL,
                secret TEXT NOT NULL DEFAULT '',
                sync_interval_minutes INTEGER NOT NULL DEFAULT 15,
                status TEXT NOT NULL DEFAULT 'active',
                last_sync_at TEXT,
                last_error TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                parent_id INTEGER,
                remote_id TEXT NOT NULL,
                name TEXT NOT NULL,
                folder_type TEXT NOT NULL DEFAULT 'custom',
                sync_enabled INTEGER NOT NULL DEFAULT 1,
                total_count INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                last_synced_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, remote_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                folder_id INTEGER,
                remote_id TEXT,
                message_id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                in_reply_to TEXT,
                references_ids TEXT NOT NULL DEFAULT '[]',
                from_name TEXT,
                from_email TEXT NOT NULL DEFAULT '',
                to_emails TEXT NOT NULL DEFAULT '[]',
                cc_emails TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                normalized_subject TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                body_text TEXT,
                body_html TEXT,
                date_received TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                is_draft INTEGER NOT NULL DEFAULT 0,
                is_sent INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                is_spam INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                labels TEXT NOT NULL DEFAULT '[]',
                assigned_to TEXT,
                attachments TEXT NOT NULL DEFAULT '[]',
                flags_changed_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, message_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                stop_on_first_match INTEGER NOT NULL DEFAULT 0,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                conditions TEXT NOT NULL,
                actions TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                display_name TEXT,
                contact_frequency INTEGER NOT NULL DEFAULT 1,
                last_contact_date TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, email)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Indexes for the hot paths: folder listings, thread grouping,
        // date-ordered search, sender lookups, rule ordering.
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_folders_account ON folders(account_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_account_folder ON messages(account_id, folder_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(account_id, date_received DESC)",
            "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(account_id, from_email)",
            "CREATE INDEX IF NOT EXISTS idx_rules_account ON rules(account_id, priority DESC)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

/// Parse an RFC 3339 timestamp column into UTC.
pub(crate) fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a nullable RFC 3339 timestamp column into UTC.
pub(crate) fn parse_utc_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().and_then(parse_utc)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn in_memory_store_initializes_schema() {
        let store = Store::in_memory().await.unwrap();

        // All tables exist and are queryable.
        for table in ["accounts", "folders", "messages", "rules", "contacts"] {
            let query = format!("SELECT COUNT(*) FROM {table}");
            sqlx::query(&query).fetch_one(store.pool()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
    }

    #[test]
    fn parse_utc_round_trips() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap();
        assert_eq!(parse_utc(&ts.to_rfc3339()), Some(ts));
    }

    #[test]
    fn parse_utc_rejects_garbage() {
        assert_eq!(parse_utc("not a timestamp"), None);
        assert_eq!(parse_utc_opt(None), None);
    }
}
