//! Account model types.

use chrono::{DateTime, Utc};
use maildesk_transport::{Security, SessionConfig};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mail provider preset for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Generic IMAP/SMTP provider.
    #[default]
    Imap,
    /// Google Mail.
    Gmail,
    /// Microsoft Outlook / Office 365.
    Outlook,
    /// Fully custom server settings.
    Custom,
}

impl ProviderKind {
    /// Storage identifier for the provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
            Self::Custom => "custom",
        }
    }

    /// Parse a storage identifier; unknown values map to `Imap`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "gmail" => Self::Gmail,
            "outlook" => Self::Outlook,
            "custom" => Self::Custom,
            _ => Self::Imap,
        }
    }
}

/// Lifecycle state of an account's synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Healthy; eligible for sync.
    #[default]
    Active,
    /// Paused by the user; skipped by sync-all.
    Inactive,
    /// A sync pass is currently running.
    Syncing,
    /// The last sync pass failed; see `last_error`.
    Error,
}

impl AccountStatus {
    /// Storage identifier for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }

    /// Parse a storage identifier; unknown values map to `Active`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "inactive" => Self::Inactive,
            "syncing" => Self::Syncing,
            "error" => Self::Error,
            _ => Self::Active,
        }
    }

    /// Whether a sync pass is in flight.
    #[must_use]
    pub const fn is_syncing(&self) -> bool {
        matches!(self, Self::Syncing)
    }
}

/// Connection settings for one direction (incoming or outgoing).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
}

impl ServerConfig {
    /// Default incoming (IMAP) port for the security mode.
    #[must_use]
    pub const fn default_incoming_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 143,
            Security::Tls => 993,
        }
    }

    /// Default outgoing (SMTP) port for the security mode.
    #[must_use]
    pub const fn default_outgoing_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }
}

/// Email account configuration and sync state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name for the account.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Provider preset.
    pub provider: ProviderKind,
    /// Incoming server settings.
    pub incoming: ServerConfig,
    /// Outgoing server settings.
    pub outgoing: ServerConfig,
    /// Login username (shared by both directions).
    pub username: String,
    /// Password or app secret. Persisted to the OS keyring, not the database.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub secret: String,
    /// Minutes between scheduled sync passes.
    pub sync_interval_minutes: u32,
    /// Current sync lifecycle state.
    pub status: AccountStatus,
    /// Completion time of the last successful sync pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// First failure of the last failed sync pass.
    pub last_error: Option<String>,
    /// Whether this is the default account.
    pub is_default: bool,
}

impl Account {
    /// Create a new empty account.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sync_interval_minutes: 15,
            ..Self::default()
        }
    }

    /// Create an account with provider settings detected from the address.
    #[must_use]
    pub fn with_email(email: &str) -> Self {
        let mut account = Self {
            email: email.to_string(),
            ..Self::new()
        };

        if let Some(domain) = email.split('@').nth(1) {
            match domain.to_lowercase().as_str() {
                "gmail.com" | "googlemail.com" => {
                    account.name = "Gmail".to_string();
                    account.provider = ProviderKind::Gmail;
                    account.incoming = ServerConfig {
                        host: "imap.gmail.com".to_string(),
                        port: 993,
                        security: Security::Tls,
                    };
                    account.outgoing = ServerConfig {
                        host: "smtp.gmail.com".to_string(),
                        port: 465,
                        security: Security::Tls,
                    };
                }
                "outlook.com" | "hotmail.com" | "live.com" => {
                    account.name = "Outlook".to_string();
                    account.provider = ProviderKind::Outlook;
                    account.incoming = ServerConfig {
                        host: "outlook.office365.com".to_string(),
                        port: 993,
                        security: Security::Tls,
                    };
                    account.outgoing = ServerConfig {
                        host: "smtp.office365.com".to_string(),
                        port: 587,
                        security: Security::StartTls,
                    };
                }
                _ => {
                    account.name = domain.to_string();
                    account.provider = ProviderKind::Custom;
                }
            }
        }

        account.username = email.to_string();
        account
    }

    /// Session configuration for the incoming (fetch) direction.
    #[must_use]
    pub fn incoming_session(&self) -> SessionConfig {
        SessionConfig {
            host: self.incoming.host.clone(),
            port: self.incoming.port,
            security: self.incoming.security,
            username: self.username.clone(),
            secret: self.secret.clone(),
        }
    }

    /// Session configuration for the outgoing (send) direction.
    #[must_use]
    pub fn outgoing_session(&self) -> SessionConfig {
        SessionConfig {
            host: self.outgoing.host.clone(),
            port: self.outgoing.port,
            security: self.outgoing.security,
            username: self.username.clone(),
            secret: self.secret.clone(),
        }
    }
}
