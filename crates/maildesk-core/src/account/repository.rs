//! Account storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};

use super::credentials;
use super::model::{Account, AccountId, AccountStatus, ProviderKind, ServerConfig};
use crate::store::parse_utc_opt;
use crate::{Error, Result};

/// Repository for account storage and retrieval.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Create a repository over the shared store pool.
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all accounts, default first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, provider,
                   incoming_host, incoming_port, incoming_security,
                   outgoing_host, outgoing_port, outgoing_security,
                   username, secret, sync_interval_minutes,
                   status, last_sync_at, last_error, is_default
            FROM accounts
            ORDER BY is_default DESC, name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, provider,
                   incoming_host, incoming_port, incoming_security,
                   outgoing_host, outgoing_port, outgoing_security,
                   username, secret, sync_interval_minutes,
                   status, last_sync_at, last_error, is_default
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Get account by email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, provider,
                   incoming_host, incoming_port, incoming_security,
                   outgoing_host, outgoing_port, outgoing_security,
                   username, secret, sync_interval_minutes,
                   status, last_sync_at, last_error, is_default
            FROM accounts
            WHERE email = ?
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Get the default account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_default(&self) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, provider,
                   incoming_host, incoming_port, incoming_security,
                   outgoing_host, outgoing_port, outgoing_security,
                   username, secret, sync_interval_minutes,
                   status, last_sync_at, last_error, is_default
            FROM accounts
            WHERE is_default = 1
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Save an account (insert or update).
    ///
    /// The secret goes to the system keyring; the database row stores an empty
    /// placeholder. A duplicate email address is rejected as a conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or another account already
    /// uses the email address.
    pub async fn save(&self, account: &mut Account) -> Result<()> {
        if let Some(id) = account.id {
            let taken = sqlx::query("SELECT id FROM accounts WHERE email = ? AND id != ?")
                .bind(&account.email)
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
            if taken.is_some() {
                return Err(Error::Conflict(format!(
                    "account with email {} already exists",
                    account.email
                )));
            }

            sqlx::query(
                r"
                UPDATE accounts SET
                    name = ?, email = ?, provider = ?,
                    incoming_host = ?, incoming_port = ?, incoming_security = ?,
                    outgoing_host = ?, outgoing_port = ?, outgoing_security = ?,
                    username = ?, sync_interval_minutes = ?,
                    is_default = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(account.provider.as_str())
            .bind(&account.incoming.host)
            .bind(i64::from(account.incoming.port))
            .bind(security_to_string(account.incoming.security))
            .bind(&account.outgoing.host)
            .bind(i64::from(account.outgoing.port))
            .bind(security_to_string(account.outgoing.security))
            .bind(&account.username)
            .bind(i64::from(account.sync_interval_minutes))
            .bind(account.is_default)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

            self.persist_secret(id, &account.secret).await?;
        } else {
            let taken = sqlx::query("SELECT id FROM accounts WHERE email = ?")
                .bind(&account.email)
                .fetch_optional(&self.pool)
                .await?;
            if taken.is_some() {
                return Err(Error::Conflict(format!(
                    "account with email {} already exists",
                    account.email
                )));
            }

            let result = sqlx::query(
                r"
                INSERT INTO accounts (
                    name, email, provider,
                    incoming_host, incoming_port, incoming_security,
                    outgoing_host, outgoing_port, outgoing_security,
                    username, secret, sync_interval_minutes,
                    status, is_default
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, '', ?, ?, ?)
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(account.provider.as_str())
            .bind(&account.incoming.host)
            .bind(i64::from(account.incoming.port))
            .bind(security_to_string(account.incoming.security))
            .bind(&account.outgoing.host)
            .bind(i64::from(account.outgoing.port))
            .bind(security_to_string(account.outgoing.security))
            .bind(&account.username)
            .bind(i64::from(account.sync_interval_minutes))
            .bind(account.status.as_str())
            .bind(account.is_default)
            .execute(&self.pool)
            .await?;

            let new_id = AccountId::new(result.last_insert_rowid());
            account.id = Some(new_id);

            self.persist_secret(new_id, &account.secret).await?;
        }

        // If this account is default, unset others
        if account.is_default
            && let Some(id) = account.id
        {
            sqlx::query("UPDATE accounts SET is_default = 0 WHERE id != ?")
                .bind(id.0)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Make the given account the single default.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn set_default(&self, id: AccountId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE accounts SET is_default = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.to_string()));
        }

        sqlx::query(
            "UPDATE accounts SET is_default = 0, updated_at = CURRENT_TIMESTAMP WHERE id != ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark a sync pass as started.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn begin_sync(&self, id: AccountId) -> Result<()> {
        self.update_status(id, AccountStatus::Syncing).await
    }

    /// Record a clean sync pass: status active, watermark advanced, error cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn finish_sync_ok(&self, id: AccountId, completed_at: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query(
            r"
            UPDATE accounts
            SET status = 'active', last_sync_at = ?, last_error = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(completed_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record a failed sync pass: status error, first failure kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn finish_sync_error(&self, id: AccountId, error: &str) -> Result<()> {
        let updated = sqlx::query(
            r"
            UPDATE accounts
            SET status = 'error', last_error = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Set the lifecycle status without touching the error or watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn update_status(&self, id: AccountId, status: AccountStatus) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE accounts SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete an account.
    ///
    /// The account row is removed; its folders and messages are soft-deleted
    /// in the same transaction. Credentials are removed from the keyring.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the database
    /// operation fails.
    pub async fn delete(&self, id: AccountId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.to_string()));
        }

        sqlx::query(
            "UPDATE folders SET is_deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE account_id = ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE messages SET is_deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE account_id = ?",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Err(e) = credentials::delete_credentials(id) {
            warn!("Failed to delete credentials from keyring: {e}");
        }

        Ok(())
    }

    /// Write the secret to the keyring, falling back to the database column.
    ///
    /// Headless environments have no Secret Service; the column keeps the
    /// secret there so sync still works.
    async fn persist_secret(&self, id: AccountId, secret: &str) -> Result<()> {
        match credentials::store_secret(id, secret) {
            Ok(()) => {
                sqlx::query("UPDATE accounts SET secret = '' WHERE id = ?")
                    .bind(id.0)
                    .execute(&self.pool)
                    .await?;
                debug!("Stored secret in keyring for account {}", id.0);
            }
            Err(e) => {
                warn!("Keyring unavailable for account {}: {e}", id.0);
                sqlx::query("UPDATE accounts SET secret = ? WHERE id = ?")
                    .bind(secret)
                    .bind(id.0)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Convert a database row to an Account.
///
/// Loads the secret from the system keyring first, falling back to the
/// database column.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    let id = AccountId::new(row.get("id"));

    let secret = match credentials::get_secret(id) {
        Ok(Some(secret)) => secret,
        Ok(None) => row.get("secret"),
        Err(e) => {
            warn!("Failed to load secret from keyring: {e}");
            row.get("secret")
        }
    };

    Account {
        id: Some(id),
        name: row.get("name"),
        email: row.get("email"),
        provider: ProviderKind::parse(row.get("provider")),
        incoming: ServerConfig {
            host: row.get("incoming_host"),
            port: row.get::<i64, _>("incoming_port") as u16,
            security: string_to_security(row.get("incoming_security")),
        },
        outgoing: ServerConfig {
            host: row.get("outgoing_host"),
            port: row.get::<i64, _>("outgoing_port") as u16,
            security: string_to_security(row.get("outgoing_security")),
        },
        username: row.get("username"),
        secret,
        sync_interval_minutes: row.get::<i64, _>("sync_interval_minutes") as u32,
        status: AccountStatus::parse(row.get("status")),
        last_sync_at: parse_utc_opt(row.get("last_sync_at")),
        last_error: row.get("last_error"),
        is_default: row.get::<i64, _>("is_default") != 0,
    }
}

const fn security_to_string(security: maildesk_transport::Security) -> &'static str {
    match security {
        maildesk_transport::Security::None => "none",
        maildesk_transport::Security::Tls => "tls",
        maildesk_transport::Security::StartTls => "starttls",
    }
}

fn string_to_security(s: &str) -> maildesk_transport::Security {
    match s {
        "none" => maildesk_transport::Security::None,
        "starttls" => maildesk_transport::Security::StartTls,
        _ => maildesk_transport::Security::Tls,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn repo() -> AccountRepository {
        Store::in_memory().await.unwrap().accounts()
    }

    fn account(email: &str) -> Account {
        let mut account = Account::with_email(email);
        account.secret = "secret".to_string();
        account
    }

    #[tokio::test]
    async fn create_and_retrieve_account() {
        let repo = repo().await;

        let mut saved = account("test@gmail.com");
        repo.save(&mut saved).await.unwrap();
        assert!(saved.id.is_some());

        let retrieved = repo.get(saved.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(retrieved.email, "test@gmail.com");
        assert_eq!(retrieved.provider, ProviderKind::Gmail);
        assert_eq!(retrieved.incoming.host, "imap.gmail.com");
        assert_eq!(retrieved.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let repo = repo().await;

        repo.save(&mut account("studio@example.com")).await.unwrap();
        let err = repo
            .save(&mut account("studio@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn list_orders_default_first() {
        let repo = repo().await;

        repo.save(&mut account("b@example.com")).await.unwrap();
        let mut default = account("z@example.com");
        default.is_default = true;
        repo.save(&mut default).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].email, "z@example.com");
        assert!(accounts[0].is_default);
    }

    #[tokio::test]
    async fn set_default_leaves_exactly_one() {
        let repo = repo().await;

        let mut first = account("first@example.com");
        first.is_default = true;
        repo.save(&mut first).await.unwrap();
        let mut second = account("second@example.com");
        repo.save(&mut second).await.unwrap();

        repo.set_default(second.id.unwrap()).await.unwrap();

        let accounts = repo.list().await.unwrap();
        let defaults: Vec<_> = accounts.iter().filter(|a| a.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].email, "second@example.com");
    }

    #[tokio::test]
    async fn set_default_unknown_account_fails() {
        let repo = repo().await;
        let err = repo.set_default(AccountId::new(404)).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn sync_status_transitions() {
        let repo = repo().await;
        let mut saved = account("sync@example.com");
        repo.save(&mut saved).await.unwrap();
        let id = saved.id.unwrap();

        repo.begin_sync(id).await.unwrap();
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().status,
            AccountStatus::Syncing
        );

        repo.finish_sync_error(id, "Sent: connection reset")
            .await
            .unwrap();
        let failed = repo.get(id).await.unwrap().unwrap();
        assert_eq!(failed.status, AccountStatus::Error);
        assert_eq!(failed.last_error.as_deref(), Some("Sent: connection reset"));

        let completed = chrono::Utc::now();
        repo.finish_sync_ok(id, completed).await.unwrap();
        let healthy = repo.get(id).await.unwrap().unwrap();
        assert_eq!(healthy.status, AccountStatus::Active);
        assert!(healthy.last_error.is_none());
        assert!(healthy.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn delete_removes_account() {
        let repo = repo().await;
        let mut saved = account("gone@example.com");
        repo.save(&mut saved).await.unwrap();
        let id = saved.id.unwrap();

        repo.delete(id).await.unwrap();
        assert!(repo.get(id).await.unwrap().is_none());

        let err = repo.delete(id).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn update_preserves_identity() {
        let repo = repo().await;
        let mut saved = account("rename@example.com");
        repo.save(&mut saved).await.unwrap();
        let id = saved.id.unwrap();

        saved.name = "Studio Front Desk".to_string();
        saved.sync_interval_minutes = 5;
        repo.save(&mut saved).await.unwrap();

        let updated = repo.get(id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Studio Front Desk");
        assert_eq!(updated.sync_interval_minutes, 5);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
