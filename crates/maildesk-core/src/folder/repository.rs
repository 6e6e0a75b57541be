//! Folder storage repository.

use chrono::{DateTime, Utc};
use maildesk_transport::RemoteFolder;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::model::{Folder, FolderId, FolderType};
use crate::account::AccountId;
use crate::store::parse_utc_opt;
use crate::{Error, Result};

/// Repository for folder storage and retrieval.
pub struct FolderRepository {
    pool: SqlitePool,
}

impl FolderRepository {
    /// Create a repository over the shared store pool.
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all live folders for an account, well-known roles first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, account_id: AccountId) -> Result<Vec<Folder>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, parent_id, remote_id, name, folder_type,
                   sync_enabled, total_count, unread_count, last_synced_at, is_deleted
            FROM folders
            WHERE account_id = ? AND is_deleted = 0
            ORDER BY CASE folder_type
                WHEN 'inbox' THEN 0
                WHEN 'drafts' THEN 1
                WHEN 'sent' THEN 2
                WHEN 'archive' THEN 3
                WHEN 'spam' THEN 4
                WHEN 'trash' THEN 5
                ELSE 6
            END, name ASC
            ",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_folder).collect())
    }

    /// Get folder by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: FolderId) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, parent_id, remote_id, name, folder_type,
                   sync_enabled, total_count, unread_count, last_synced_at, is_deleted
            FROM folders
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_folder))
    }

    /// Get a folder by its remote identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_remote(
        &self,
        account_id: AccountId,
        remote_id: &str,
    ) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, parent_id, remote_id, name, folder_type,
                   sync_enabled, total_count, unread_count, last_synced_at, is_deleted
            FROM folders
            WHERE account_id = ? AND remote_id = ?
            ",
        )
        .bind(account_id.0)
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_folder))
    }

    /// Get the account's folder with the given role, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_type(
        &self,
        account_id: AccountId,
        folder_type: FolderType,
    ) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, parent_id, remote_id, name, folder_type,
                   sync_enabled, total_count, unread_count, last_synced_at, is_deleted
            FROM folders
            WHERE account_id = ? AND folder_type = ? AND is_deleted = 0
            LIMIT 1
            ",
        )
        .bind(account_id.0)
        .bind(folder_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_folder))
    }

    /// Save a folder (insert or update).
    ///
    /// Parent assignments are validated: the parent must belong to the same
    /// account and must not create a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the database operation fails.
    pub async fn save(&self, folder: &mut Folder) -> Result<()> {
        if let Some(parent_id) = folder.parent_id {
            self.validate_parent(folder, parent_id).await?;
        }

        if let Some(id) = folder.id {
            sqlx::query(
                r"
                UPDATE folders SET
                    parent_id = ?, remote_id = ?, name = ?, folder_type = ?,
                    sync_enabled = ?, is_deleted = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(folder.parent_id.map(|p| p.0))
            .bind(&folder.remote_id)
            .bind(&folder.name)
            .bind(folder.folder_type.as_str())
            .bind(folder.sync_enabled)
            .bind(folder.is_deleted)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let existing = sqlx::query("SELECT id FROM folders WHERE account_id = ? AND remote_id = ?")
                .bind(folder.account_id.0)
                .bind(&folder.remote_id)
                .fetch_optional(&self.pool)
                .await?;
            if existing.is_some() {
                return Err(Error::Conflict(format!(
                    "folder {} already exists for account {}",
                    folder.remote_id, folder.account_id
                )));
            }

            let result = sqlx::query(
                r"
                INSERT INTO folders (
                    account_id, parent_id, remote_id, name, folder_type, sync_enabled
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(folder.account_id.0)
            .bind(folder.parent_id.map(|p| p.0))
            .bind(&folder.remote_id)
            .bind(&folder.name)
            .bind(folder.folder_type.as_str())
            .bind(folder.sync_enabled)
            .execute(&self.pool)
            .await?;

            folder.id = Some(FolderId::new(result.last_insert_rowid()));
        }

        Ok(())
    }

    /// Insert or refresh a folder from the remote folder list.
    ///
    /// An existing row keeps its watermark, counters, and sync flag; a
    /// soft-deleted row is resurrected.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_remote(
        &self,
        account_id: AccountId,
        remote: &RemoteFolder,
    ) -> Result<Folder> {
        sqlx::query(
            r"
            INSERT INTO folders (account_id, remote_id, name, folder_type, sync_enabled)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(account_id, remote_id) DO UPDATE SET
                name = excluded.name,
                is_deleted = 0,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(account_id.0)
        .bind(&remote.remote_id)
        .bind(&remote.name)
        .bind(FolderType::detect(&remote.name).as_str())
        .bind(remote.selectable)
        .execute(&self.pool)
        .await?;

        self.get_by_remote(account_id, &remote.remote_id)
            .await?
            .ok_or_else(|| Error::FolderNotFound(remote.remote_id.clone()))
    }

    /// Enable or disable sync for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or the update fails.
    pub async fn set_sync_enabled(&self, id: FolderId, enabled: bool) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE folders SET sync_enabled = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(enabled)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::FolderNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Advance the sync watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or the update fails.
    pub async fn update_watermark(&self, id: FolderId, at: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE folders SET last_synced_at = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::FolderNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Recompute the cached counters from live messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn recompute_counts(&self, id: FolderId) -> Result<()> {
        recompute_folder_counts(&self.pool, id.0).await?;
        Ok(())
    }

    /// Soft-delete a folder and the messages in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or the update fails.
    pub async fn soft_delete(&self, id: FolderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE folders SET is_deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::FolderNotFound(id.to_string()));
        }

        sqlx::query(
            "UPDATE messages SET is_deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE folder_id = ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Soft-deleted folder {id}");
        Ok(())
    }

    /// Check that a parent assignment stays within the account and is acyclic.
    async fn validate_parent(&self, folder: &Folder, parent_id: FolderId) -> Result<()> {
        if folder.id == Some(parent_id) {
            return Err(Error::Conflict("folder cannot be its own parent".into()));
        }

        let parent = self
            .get(parent_id)
            .await?
            .ok_or_else(|| Error::FolderNotFound(parent_id.to_string()))?;
        if parent.account_id != folder.account_id {
            return Err(Error::Conflict(
                "parent folder belongs to a different account".into(),
            ));
        }

        // Walk up from the proposed parent; hitting this folder means a cycle.
        let mut current = parent.parent_id;
        let mut depth = 0;
        while let Some(ancestor_id) = current {
            if Some(ancestor_id) == folder.id {
                return Err(Error::Conflict("folder hierarchy cycle".into()));
            }
            depth += 1;
            if depth > 100 {
                return Err(Error::Conflict("folder hierarchy too deep".into()));
            }
            current = self
                .get(ancestor_id)
                .await?
                .and_then(|ancestor| ancestor.parent_id);
        }

        Ok(())
    }
}

/// Advance the sync watermark inside any executor (pool or transaction).
pub(crate) async fn set_folder_watermark<'e, E>(
    executor: E,
    folder_id: i64,
    at: DateTime<Utc>,
) -> std::result::Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "UPDATE folders SET last_synced_at = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(at.to_rfc3339())
    .bind(folder_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Recompute a folder's cached counters inside any executor (pool or
/// transaction). Counts exclude soft-deleted messages.
pub(crate) async fn recompute_folder_counts<'e, E>(
    executor: E,
    folder_id: i64,
) -> std::result::Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r"
        UPDATE folders SET
            total_count = (
                SELECT COUNT(*) FROM messages
                WHERE folder_id = folders.id AND is_deleted = 0
            ),
            unread_count = (
                SELECT COUNT(*) FROM messages
                WHERE folder_id = folders.id AND is_deleted = 0 AND is_read = 0
            ),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        ",
    )
    .bind(folder_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Convert a database row to a Folder.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_folder(row: &sqlx::sqlite::SqliteRow) -> Folder {
    Folder {
        id: Some(FolderId::new(row.get("id"))),
        account_id: AccountId::new(row.get("account_id")),
        parent_id: row.get::<Option<i64>, _>("parent_id").map(FolderId::new),
        remote_id: row.get("remote_id"),
        name: row.get("name"),
        folder_type: FolderType::parse(row.get("folder_type")),
        sync_enabled: row.get::<i64, _>("sync_enabled") != 0,
        total_count: row.get::<i64, _>("total_count") as u32,
        unread_count: row.get::<i64, _>("unread_count") as u32,
        last_synced_at: parse_utc_opt(row.get("last_synced_at")),
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
    }
}
