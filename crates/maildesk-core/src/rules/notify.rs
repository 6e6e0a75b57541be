use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::account::AccountId;
use crate::message::MessageId;
use crate::rules::model::RuleId;

/// What kind of rule activity an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEventKind {
    /// A rule matched a message and its actions were applied.
    Matched,
    /// An explicit `Notify` action fired.
    Notify,
}

/// One rule engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvent {
    /// Activity kind.
    #[serde(rename = "type")]
    pub kind: RuleEventKind,
    /// Account whose message triggered the rule.
    pub account_id: AccountId,
    /// The message the rule ran against.
    pub message_id: MessageId,
    /// The rule that fired.
    pub rule_id: RuleId,
}

/// Receives rule engine events.
///
/// Sinks never fail the caller; one that cannot deliver drops the event.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: RuleEvent);
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn emit(&self, event: RuleEvent) {
        info!(
            kind = ?event.kind,
            account_id = %event.account_id,
            message_id = %event.message_id,
            rule_id = %event.rule_id,
            "rule event"
        );
    }
}

/// Sink that forwards events over an unbounded channel, for UIs that render
/// notifications.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<RuleEvent>,
}

impl ChannelSink {
    /// Creates the sink together with its receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RuleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn emit(&self, event: RuleEvent) {
        if self.sender.send(event).is_err() {
            debug!("notification receiver dropped, event discarded");
        }
    }
}
