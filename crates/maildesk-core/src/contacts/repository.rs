use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::account::AccountId;
use crate::contacts::model::{Contact, ContactId};
use crate::error::Result;
use crate::message::Message;
use crate::store::parse_utc;

/// `SQLite`-backed storage for observed correspondents.
pub struct ContactRepository {
    pool: SqlitePool,
}

impl ContactRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records one sighting of an address, bumping its frequency.
    ///
    /// Addresses are keyed lower-cased; blank addresses are ignored. A later
    /// sighting never moves `last_contact_date` backwards, and a display
    /// name only fills in when none is known yet.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn record_seen(
        &self,
        account_id: AccountId,
        email: &str,
        display_name: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(());
        }
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let result = sqlx::query(
            "UPDATE contacts SET \
                 contact_frequency = contact_frequency + 1, \
                 last_contact_date = max(last_contact_date, ?), \
                 display_name = COALESCE(display_name, ?), \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE account_id = ? AND email = ?",
        )
        .bind(seen_at.to_rfc3339())
        .bind(display_name)
        .bind(account_id.0)
        .bind(&email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO contacts (account_id, email, display_name, contact_frequency, \
                     last_contact_date) \
                 VALUES (?, ?, ?, 1, ?)",
            )
            .bind(account_id.0)
            .bind(&email)
            .bind(display_name)
            .bind(seen_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Records the correspondents of a stored message: the sender for
    /// received mail, the recipients for sent mail.
    ///
    /// # Errors
    /// Returns an error if a write fails.
    pub async fn record_from_message(&self, message: &Message) -> Result<()> {
        if message.flags.is_sent || message.flags.is_draft {
            for address in message.to_emails.iter().chain(&message.cc_emails) {
                self.record_seen(message.account_id, address, None, message.date_received)
                    .await?;
            }
        } else {
            self.record_seen(
                message.account_id,
                &message.from_email,
                message.from_name.as_deref(),
                message.date_received,
            )
            .await?;
        }
        Ok(())
    }

    /// Looks up a contact by address.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(&self, account_id: AccountId, email: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, account_id, email, display_name, contact_frequency, last_contact_date \
             FROM contacts WHERE account_id = ? AND email = ?",
        )
        .bind(account_id.0)
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row_to_contact(&row)))
    }

    /// Lists an account's contacts, most frequent first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list(&self, account_id: AccountId, limit: u32) -> Result<Vec<Contact>> {
        let rows = sqlx::query(
            "SELECT id, account_id, email, display_name, contact_frequency, last_contact_date \
             FROM contacts WHERE account_id = ? \
             ORDER BY contact_frequency DESC, email ASC LIMIT ?",
        )
        .bind(account_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_contact).collect())
    }

    /// Prefix matches for address autocomplete, most frequent first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn suggest(
        &self,
        account_id: AccountId,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<Contact>> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, account_id, email, display_name, contact_frequency, last_contact_date \
             FROM contacts WHERE account_id = ? \
               AND (email LIKE ? || '%' OR lower(COALESCE(display_name, '')) LIKE ? || '%') \
             ORDER BY contact_frequency DESC, email ASC LIMIT ?",
        )
        .bind(account_id.0)
        .bind(&prefix)
        .bind(&prefix)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_contact).collect())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_contact(row: &SqliteRow) -> Contact {
    Contact {
        id: Some(ContactId::new(row.get("id"))),
        account_id: AccountId::new(row.get("account_id")),
        email: row.get("email"),
        display_name: row.get("display_name"),
        contact_frequency: row.get::<i64, _>("contact_frequency") as u32,
        last_contact_date: parse_utc(&row.get::<String, _>("last_contact_date"))
            .unwrap_or(DateTime::UNIX_EPOCH),
    }
}
