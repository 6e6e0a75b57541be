use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Unique identifier for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub i64);

impl ContactId {
    /// Create a new contact ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A correspondent observed in synced mail.
///
/// Keyed by lower-cased address per account. `contact_frequency` counts how
/// often the address has appeared; it drives autocomplete ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Database id, `None` until stored.
    pub id: Option<ContactId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Lower-cased email address.
    pub email: String,
    /// Display name from the most informative sighting.
    pub display_name: Option<String>,
    /// How many messages this address has appeared on.
    pub contact_frequency: u32,
    /// Most recent sighting.
    pub last_contact_date: DateTime<Utc>,
}

impl Contact {
    /// Name to show in pickers: display name when known, address otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}
