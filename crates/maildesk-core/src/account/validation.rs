//! Account validation.

use super::model::Account;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// Incoming server host is empty.
    EmptyIncomingHost,
    /// Incoming server port is invalid.
    InvalidIncomingPort,
    /// Outgoing server host is empty.
    EmptyOutgoingHost,
    /// Outgoing server port is invalid.
    InvalidOutgoingPort,
    /// Login username is empty.
    EmptyUsername,
    /// Secret is empty.
    EmptySecret,
    /// Sync interval must be at least one minute.
    InvalidSyncInterval,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyIncomingHost => "Incoming server is required",
            Self::InvalidIncomingPort => "Incoming port must be 1-65535",
            Self::EmptyOutgoingHost => "Outgoing server is required",
            Self::InvalidOutgoingPort => "Outgoing port must be 1-65535",
            Self::EmptyUsername => "Username is required",
            Self::EmptySecret => "Password is required",
            Self::InvalidSyncInterval => "Sync interval must be at least 1 minute",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyEmail | Self::InvalidEmail => "email",
            Self::EmptyIncomingHost => "incoming_host",
            Self::InvalidIncomingPort => "incoming_port",
            Self::EmptyOutgoingHost => "outgoing_host",
            Self::InvalidOutgoingPort => "outgoing_port",
            Self::EmptyUsername => "username",
            Self::EmptySecret => "secret",
            Self::InvalidSyncInterval => "sync_interval_minutes",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if account.email.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.email) {
        errors.push(ValidationError::InvalidEmail);
    }

    if account.incoming.host.trim().is_empty() {
        errors.push(ValidationError::EmptyIncomingHost);
    }
    if account.incoming.port == 0 {
        errors.push(ValidationError::InvalidIncomingPort);
    }

    if account.outgoing.host.trim().is_empty() {
        errors.push(ValidationError::EmptyOutgoingHost);
    }
    if account.outgoing.port == 0 {
        errors.push(ValidationError::InvalidOutgoingPort);
    }

    if account.username.trim().is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if account.secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }
    if account.sync_interval_minutes == 0 {
        errors.push(ValidationError::InvalidSyncInterval);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Basic email validation.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    // Must contain exactly one @
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() {
        return false;
    }

    // Domain must contain at least one dot and not be empty
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    if domain_parts.iter().any(|p| p.is_empty()) {
        return false;
    }

    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn complete_account() -> Account {
        let mut account = Account::with_email("studio@gmail.com");
        account.secret = "app-password".to_string();
        account
    }

    #[test]
    fn valid_email_shapes() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user@sub.example.com"));
    }

    #[test]
    fn invalid_email_shapes() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@.example.com"));
    }

    #[test]
    fn empty_account_collects_all_errors() {
        let account = Account::new();
        let errors = validate_account(&account).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyName));
        assert!(errors.contains(&ValidationError::EmptyEmail));
        assert!(errors.contains(&ValidationError::EmptyIncomingHost));
        assert!(errors.contains(&ValidationError::EmptyUsername));
        assert!(errors.contains(&ValidationError::EmptySecret));
    }

    #[test]
    fn complete_account_passes() {
        assert!(validate_account(&complete_account()).is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut account = complete_account();
        account.sync_interval_minutes = 0;
        let errors = validate_account(&account).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidSyncInterval]);
    }

    #[test]
    fn error_maps_to_field() {
        assert_eq!(ValidationError::EmptySecret.field(), "secret");
        assert_eq!(ValidationError::InvalidEmail.field(), "email");
    }
}
