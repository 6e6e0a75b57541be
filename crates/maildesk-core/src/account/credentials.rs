//! Secure credential storage using the system keyring.
//!
//! Account secrets are stored in the platform's native credential store:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! The database row keeps only an empty placeholder; the secret itself lives
//! under a key derived from the account id.

use keyring::Entry;
use tracing::debug;

use super::AccountId;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "maildesk";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Account ID is required for credential operations.
    #[error("Account ID is required for credential storage")]
    MissingAccountId,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Generates the keyring entry key for an account secret.
fn credential_key(account_id: AccountId) -> String {
    format!("{SERVICE_NAME}_secret_{}", account_id.0)
}

/// Stores an account secret in the system keyring.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn store_secret(account_id: AccountId, secret: &str) -> CredentialResult<()> {
    let key = credential_key(account_id);
    let entry = Entry::new(SERVICE_NAME, &key)?;
    entry.set_password(secret)?;
    debug!("Stored secret for account {}", account_id.0);
    Ok(())
}

/// Retrieves an account secret from the system keyring.
///
/// Returns `None` when no secret has been stored for the account.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn get_secret(account_id: AccountId) -> CredentialResult<Option<String>> {
    let key = credential_key(account_id);
    let entry = Entry::new(SERVICE_NAME, &key)?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => {
            debug!("No secret found for account {}", account_id.0);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the stored secret for an account.
///
/// This should be called when an account is deleted. A missing entry is not
/// an error.
///
/// # Errors
///
/// Returns an error if the keyring operation fails (except for missing entries).
pub fn delete_credentials(account_id: AccountId) -> CredentialResult<()> {
    let key = credential_key(account_id);
    let entry = Entry::new(SERVICE_NAME, &key)?;
    match entry.delete_credential() {
        Ok(()) => {
            debug!("Deleted secret for account {}", account_id.0);
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No secret to delete for account {}", account_id.0);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Stores the secret for an account that may not be saved yet.
///
/// # Errors
///
/// Returns an error if the account has no ID or the keyring operation fails.
pub fn store_account_secret(account_id: Option<AccountId>, secret: &str) -> CredentialResult<()> {
    let id = account_id.ok_or(CredentialError::MissingAccountId)?;
    store_secret(id, secret)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    // Note: These tests interact with the actual system keyring.
    // They are marked as ignored by default to avoid polluting the keyring
    // during automated testing. Run manually with `cargo test -- --ignored`

    use super::*;

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn store_and_retrieve_secret() {
        let account_id = AccountId::new(99999); // Use high ID to avoid conflicts
        let secret = "test_secret_12345";

        store_secret(account_id, secret).unwrap();

        let retrieved = get_secret(account_id).unwrap();
        assert_eq!(retrieved, Some(secret.to_string()));

        delete_credentials(account_id).unwrap();
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn delete_is_idempotent() {
        let account_id = AccountId::new(99998);

        store_secret(account_id, "secret").unwrap();
        delete_credentials(account_id).unwrap();
        delete_credentials(account_id).unwrap();

        assert_eq!(get_secret(account_id).unwrap(), None);
    }

    #[test]
    fn missing_account_id_rejected() {
        let result = store_account_secret(None, "secret");
        assert!(matches!(result, Err(CredentialError::MissingAccountId)));
    }
}
