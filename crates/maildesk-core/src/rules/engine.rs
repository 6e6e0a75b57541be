use std::sync::Arc;

use tracing::warn;

use crate::bulk::{BulkEngine, BulkMutation};
use crate::error::{Error, Result};
use crate::message::{Message, MessageId};
use crate::rules::model::{Action, Rule, RuleId};
use crate::rules::notify::{NotificationSink, RuleEvent, RuleEventKind, TracingSink};
use crate::store::Store;

/// Applies triage rules to stored messages.
///
/// Rules run in evaluation order; every mutation goes through the bulk
/// engine one message at a time, so reapplying a rule is as idempotent as
/// the mutations themselves.
pub struct RuleEngine {
    store: Store,
    bulk: BulkEngine,
    sink: Arc<dyn NotificationSink>,
}

impl RuleEngine {
    /// Creates an engine that reports events to the given sink.
    #[must_use]
    pub fn new(store: Store, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            bulk: BulkEngine::new(store.clone()),
            store,
            sink,
        }
    }

    /// Creates an engine that only logs events.
    #[must_use]
    pub fn with_tracing_sink(store: Store) -> Self {
        Self::new(store, Arc::new(TracingSink))
    }

    /// Runs every applicable rule against one stored message.
    ///
    /// Returns the rules that applied, in evaluation order. A failing rule
    /// is logged and skipped; it never aborts the remaining rules. A rule
    /// whose move target is missing or foreign is inert for this message.
    ///
    /// # Errors
    /// Returns [`Error::MessageNotFound`] for an unknown message, or an
    /// error when the rule list cannot be loaded.
    pub async fn apply_to_message(&self, id: MessageId) -> Result<Vec<RuleId>> {
        let Some(mut message) = self.store.messages().get(id).await? else {
            return Err(Error::MessageNotFound(id.to_string()));
        };
        let rules = self
            .store
            .rules()
            .list_for_account(message.account_id)
            .await?;

        let mut applied = Vec::new();
        for rule in rules {
            if !rule.matches(&message) {
                continue;
            }
            let Some(rule_id) = rule.id else { continue };
            match self.apply_rule(&rule, rule_id, &message).await {
                Ok(true) => {
                    applied.push(rule_id);
                    self.sink
                        .emit(RuleEvent {
                            kind: RuleEventKind::Matched,
                            account_id: message.account_id,
                            message_id: id,
                            rule_id,
                        })
                        .await;
                    if rule.stop_on_first_match {
                        break;
                    }
                    // Later rules evaluate against the mutated message.
                    match self.store.messages().get(id).await? {
                        Some(updated) => message = updated,
                        None => break,
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(rule = %rule.name, error = %err, "rule application failed");
                }
            }
        }
        Ok(applied)
    }

    /// Applies one rule's actions. `Ok(false)` means the rule was inert.
    async fn apply_rule(&self, rule: &Rule, rule_id: RuleId, message: &Message) -> Result<bool> {
        let Some(message_id) = message.id else {
            return Ok(false);
        };

        // A move whose target is unusable makes the whole rule inert rather
        // than applying half of its actions.
        for action in &rule.actions {
            if let Action::MoveToFolder { folder_id } = action {
                let target = self.store.folders().get(*folder_id).await?;
                let usable = target.is_some_and(|folder| {
                    !folder.is_deleted && folder.account_id == message.account_id
                });
                if !usable {
                    warn!(
                        rule = %rule.name,
                        folder_id = %folder_id,
                        "move target unusable, rule skipped"
                    );
                    return Ok(false);
                }
            }
        }

        for action in &rule.actions {
            let mutation = match action {
                Action::SetFlag { flag, value } => Some(BulkMutation::SetFlag {
                    flag: *flag,
                    value: *value,
                }),
                Action::AddLabels { labels } => Some(BulkMutation::AddLabels {
                    labels: labels.clone(),
                }),
                Action::RemoveLabels { labels } => Some(BulkMutation::RemoveLabels {
                    labels: labels.clone(),
                }),
                Action::MoveToFolder { folder_id } => Some(BulkMutation::MoveToFolder {
                    folder_id: *folder_id,
                }),
                Action::Notify => {
                    self.sink
                        .emit(RuleEvent {
                            kind: RuleEventKind::Notify,
                            account_id: message.account_id,
                            message_id,
                            rule_id,
                        })
                        .await;
                    None
                }
            };
            if let Some(mutation) = mutation {
                let report = self.bulk.apply(&[message_id], &mutation).await?;
                for failure in report.failed {
                    warn!(
                        rule = %rule.name,
                        message_id = %failure.id,
                        reason = %failure.reason,
                        "rule action failed"
                    );
                }
            }
        }
        Ok(true)
    }
}
