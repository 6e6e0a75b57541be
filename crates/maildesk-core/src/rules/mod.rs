//! Condition/action triage rules.
//!
//! Rules are stored per account or globally, evaluated in a fixed order,
//! and applied through the bulk engine so their effects stay idempotent.
//! Matches surface as events through a [`NotificationSink`].

mod engine;
mod model;
mod notify;
mod repository;

pub use engine::RuleEngine;
pub use model::{Action, Condition, MessageField, Rule, RuleId};
pub use notify::{ChannelSink, NotificationSink, RuleEvent, RuleEventKind, TracingSink};
pub use repository::RuleRepository;
