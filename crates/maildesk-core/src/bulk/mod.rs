//! Bulk message mutations with per-item outcomes.
//!
//! A batch never fails as a whole: each message is mutated atomically on its
//! own, and the report says which ids succeeded and which failed with what
//! reason. Duplicate ids are applied once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::folder::FolderId;
use crate::message::{FlagKind, MessageId, MessageRepository};
use crate::store::Store;

/// One mutation applied to every message in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BulkMutation {
    /// Set a single flag to a value.
    SetFlag {
        /// Which flag to change.
        flag: FlagKind,
        /// The value to set.
        value: bool,
    },
    /// Add labels to each message's set.
    AddLabels {
        /// Labels to add.
        labels: Vec<String>,
    },
    /// Remove labels from each message's set.
    RemoveLabels {
        /// Labels to remove.
        labels: Vec<String>,
    },
    /// Move each message into the given folder.
    MoveToFolder {
        /// Target folder; must belong to each message's account.
        folder_id: FolderId,
    },
}

/// One failed item in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationFailure {
    /// The message that could not be mutated.
    pub id: MessageId,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome of a bulk apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationReport {
    /// Ids mutated successfully, in apply order.
    pub succeeded: Vec<MessageId>,
    /// Ids that failed, each with a reason.
    pub failed: Vec<MutationFailure>,
}

impl MutationReport {
    /// Whether every item succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, id: MessageId, reason: impl Into<String>) {
        self.failed.push(MutationFailure {
            id,
            reason: reason.into(),
        });
    }
}

/// Applies one mutation across many messages.
pub struct BulkEngine {
    store: Store,
}

impl BulkEngine {
    /// Create an engine over the given store.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Applies `mutation` to every id, one message at a time.
    ///
    /// A failing item is reported and never rolls back the others. A move
    /// whose target folder does not exist fails every id up front without
    /// touching any row.
    ///
    /// # Errors
    /// Returns an error only when the store itself is unusable; per-item
    /// problems land in the report instead.
    pub async fn apply(
        &self,
        ids: &[MessageId],
        mutation: &BulkMutation,
    ) -> Result<MutationReport> {
        let ids = dedupe(ids);
        let mut report = MutationReport::default();

        if let BulkMutation::MoveToFolder { folder_id } = mutation {
            let target = self.store.folders().get(*folder_id).await?;
            if target.is_none_or(|folder| folder.is_deleted) {
                let reason = Error::FolderNotFound(folder_id.to_string()).to_string();
                for id in ids {
                    report.fail(id, &reason);
                }
                return Ok(report);
            }
        }

        let messages = self.store.messages();
        for id in ids {
            match apply_one(&messages, id, mutation).await {
                Ok(()) => report.succeeded.push(id),
                Err(err) => {
                    warn!(message_id = %id, error = %err, "bulk mutation item failed");
                    report.fail(id, err.to_string());
                }
            }
        }
        Ok(report)
    }
}

async fn apply_one(
    messages: &MessageRepository,
    id: MessageId,
    mutation: &BulkMutation,
) -> Result<()> {
    match mutation {
        BulkMutation::SetFlag { flag, value } => messages.set_flag(id, *flag, *value).await,
        BulkMutation::AddLabels { labels } => messages.add_labels(id, labels).await.map(|_| ()),
        BulkMutation::RemoveLabels { labels } => {
            messages.remove_labels(id, labels).await.map(|_| ())
        }
        BulkMutation::MoveToFolder { folder_id } => messages.move_to_folder(id, *folder_id).await,
    }
}

fn dedupe(ids: &[MessageId]) -> Vec<MessageId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountId};
    use crate::folder::Folder;
    use crate::message::Message;
    use chrono::{TimeZone, Utc};

    async fn fixture() -> (Store, AccountId, FolderId, Vec<MessageId>) {
        let store = Store::in_memory().await.unwrap();
        let mut account = Account::with_email("studio@lenswork.example");
        store.accounts().save(&mut account).await.unwrap();
        let account_id = account.id.unwrap();
        let mut inbox = Folder::new(account_id, "INBOX", "INBOX");
        store.folders().save(&mut inbox).await.unwrap();

        let mut ids = Vec::new();
        for n in 1..=3 {
            let mut message = Message::new(
                account_id,
                format!("<bulk-{n}@example.com>"),
                "client@example.com",
                format!("Session {n}"),
                Utc.with_ymd_and_hms(2024, 8, n, 10, 0, 0).unwrap(),
            );
            message.folder_id = inbox.id;
            store.messages().create_local(&mut message).await.unwrap();
            ids.push(message.id.unwrap());
        }
        (store, account_id, inbox.id.unwrap(), ids)
    }

    #[tokio::test]
    async fn invalid_id_is_reported_while_others_succeed() {
        let (store, _, _, ids) = fixture().await;
        let engine = BulkEngine::new(store.clone());

        let mut batch = ids.clone();
        batch.push(MessageId::new(9999));
        let report = engine
            .apply(
                &batch,
                &BulkMutation::SetFlag {
                    flag: FlagKind::Read,
                    value: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded, ids);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, MessageId::new(9999));
        assert!(!report.is_complete());

        for id in ids {
            assert!(store.messages().get(id).await.unwrap().unwrap().flags.is_read);
        }
    }

    #[tokio::test]
    async fn duplicate_ids_apply_once() {
        let (store, _, _, ids) = fixture().await;
        let engine = BulkEngine::new(store);

        let batch = vec![ids[0], ids[0], ids[0]];
        let report = engine
            .apply(
                &batch,
                &BulkMutation::AddLabels {
                    labels: vec!["vip".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, vec![ids[0]]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn label_add_is_idempotent_across_batches() {
        let (store, _, _, ids) = fixture().await;
        let engine = BulkEngine::new(store.clone());
        let mutation = BulkMutation::AddLabels {
            labels: vec!["vip".to_string()],
        };

        engine.apply(&ids[..1], &mutation).await.unwrap();
        engine.apply(&ids[..1], &mutation).await.unwrap();

        let stored = store.messages().get(ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.labels, vec!["vip"]);
    }

    #[tokio::test]
    async fn missing_move_target_fails_every_id() {
        let (store, _, _, ids) = fixture().await;
        let engine = BulkEngine::new(store.clone());

        let report = engine
            .apply(
                &ids,
                &BulkMutation::MoveToFolder {
                    folder_id: FolderId::new(404),
                },
            )
            .await
            .unwrap();
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), ids.len());

        // No row moved.
        for id in ids {
            let stored = store.messages().get(id).await.unwrap().unwrap();
            assert!(stored.folder_id.is_some());
        }
    }

    #[tokio::test]
    async fn cross_account_move_is_a_per_item_conflict() {
        let (store, _, _, ids) = fixture().await;
        let mut other = Account::with_email("second@lenswork.example");
        store.accounts().save(&mut other).await.unwrap();
        let mut foreign = Folder::new(other.id.unwrap(), "INBOX", "INBOX");
        store.folders().save(&mut foreign).await.unwrap();

        let engine = BulkEngine::new(store);
        let report = engine
            .apply(
                &ids[..1],
                &BulkMutation::MoveToFolder {
                    folder_id: foreign.id.unwrap(),
                },
            )
            .await
            .unwrap();
        assert!(report.succeeded.is_empty());
        assert!(report.failed[0].reason.contains("another account"));
    }

    #[tokio::test]
    async fn move_batch_lands_in_the_target_folder() {
        let (store, account_id, inbox, ids) = fixture().await;
        let mut archive = Folder::new(account_id, "Archive", "Archive");
        store.folders().save(&mut archive).await.unwrap();
        let archive_id = archive.id.unwrap();

        let engine = BulkEngine::new(store.clone());
        let report = engine
            .apply(&ids, &BulkMutation::MoveToFolder { folder_id: archive_id })
            .await
            .unwrap();
        assert!(report.is_complete());

        let moved = store.folders().get(archive_id).await.unwrap().unwrap();
        assert_eq!(moved.total_count, 3);
        let old = store.folders().get(inbox).await.unwrap().unwrap();
        assert_eq!(old.total_count, 0);
    }
}
