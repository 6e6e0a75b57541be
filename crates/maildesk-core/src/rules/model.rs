use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::folder::FolderId;
use crate::message::{FlagKind, Message};

/// Unique identifier for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub i64);

impl RuleId {
    /// Create a new rule ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message fields a text condition can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageField {
    /// Sender address and display name.
    Sender,
    /// Any `To` or `Cc` address.
    Recipient,
    /// Subject line.
    Subject,
    /// Plain-text body, falling back to the snippet.
    Body,
}

impl MessageField {
    fn equals(self, message: &Message, value: &str) -> bool {
        let wanted = value.to_lowercase();
        match self {
            Self::Sender => message.from_email == wanted,
            Self::Recipient => message
                .to_emails
                .iter()
                .chain(&message.cc_emails)
                .any(|address| *address == wanted),
            Self::Subject => message.subject.to_lowercase() == wanted,
            Self::Body => body_text(message).to_lowercase() == wanted,
        }
    }

    fn contains(self, message: &Message, value: &str) -> bool {
        let needle = value.to_lowercase();
        match self {
            Self::Sender => {
                message.from_email.contains(&needle)
                    || message
                        .from_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            }
            Self::Recipient => message
                .to_emails
                .iter()
                .chain(&message.cc_emails)
                .any(|address| address.contains(&needle)),
            Self::Subject => message.subject.to_lowercase().contains(&needle),
            Self::Body => body_text(message).to_lowercase().contains(&needle),
        }
    }
}

fn body_text(message: &Message) -> &str {
    message.body_text.as_deref().unwrap_or(&message.snippet)
}

/// One predicate of a rule. A rule matches when every condition holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    /// Field equals the value, case-insensitive.
    FieldEquals {
        /// Field to inspect.
        field: MessageField,
        /// Expected value.
        value: String,
    },
    /// Field contains the value, case-insensitive.
    FieldContains {
        /// Field to inspect.
        field: MessageField,
        /// Substring to look for.
        value: String,
    },
    /// A flag has the given value.
    FlagIs {
        /// Flag to inspect.
        flag: FlagKind,
        /// Expected value.
        value: bool,
    },
    /// The message carries at least one of the labels.
    LabelOverlap {
        /// Labels to look for.
        labels: Vec<String>,
    },
    /// Received inside a bounded window; `from` inclusive, `to` exclusive.
    DateRange {
        /// Earliest arrival, inclusive.
        from: Option<DateTime<Utc>>,
        /// Latest arrival, exclusive.
        to: Option<DateTime<Utc>>,
    },
}

impl Condition {
    /// Whether the condition holds for the message.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::FieldEquals { field, value } => field.equals(message, value),
            Self::FieldContains { field, value } => field.contains(message, value),
            Self::FlagIs { flag, value } => message.flags.get(*flag) == *value,
            Self::LabelOverlap { labels } => {
                labels.iter().any(|label| message.has_label(label))
            }
            Self::DateRange { from, to } => {
                from.is_none_or(|from| message.date_received >= from)
                    && to.is_none_or(|to| message.date_received < to)
            }
        }
    }
}

/// One effect a matching rule applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Set a flag to a value.
    SetFlag {
        /// Flag to change.
        flag: FlagKind,
        /// Value to set.
        value: bool,
    },
    /// Add labels to the message.
    AddLabels {
        /// Labels to add.
        labels: Vec<String>,
    },
    /// Remove labels from the message.
    RemoveLabels {
        /// Labels to remove.
        labels: Vec<String>,
    },
    /// Move the message into a folder of its own account.
    MoveToFolder {
        /// Target folder id.
        folder_id: FolderId,
    },
    /// Emit a notification event for the message.
    Notify,
}

/// A triage rule: conditions ANDed, actions applied in order.
///
/// Rules without an `account_id` are global and run for every account, after
/// that account's own rules. Within each group higher `priority` runs first,
/// ties broken by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Database id, `None` until stored.
    pub id: Option<RuleId>,
    /// Owning account, or `None` for a global rule.
    pub account_id: Option<AccountId>,
    /// Human-readable name, unique enough to order ties.
    pub name: String,
    /// Higher runs earlier within its group.
    pub priority: i32,
    /// Stop evaluating later rules for a message once this one applies.
    pub stop_on_first_match: bool,
    /// Disabled rules are skipped entirely.
    pub is_enabled: bool,
    /// Predicates, all of which must hold. Empty matches every message.
    pub conditions: Vec<Condition>,
    /// Effects applied when the rule matches.
    pub actions: Vec<Action>,
}

impl Rule {
    /// Create an enabled rule with no conditions or actions yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            account_id: None,
            name: name.into(),
            priority: 0,
            stop_on_first_match: false,
            is_enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Whether every condition holds for the message.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.conditions.iter().all(|condition| condition.matches(message))
    }
}
