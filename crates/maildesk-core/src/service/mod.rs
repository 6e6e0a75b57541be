//! High-level mail operations.
//!
//! [`MailService`] is the upward API surface: it composes the store, the
//! transport, and the sync, bulk, and rule engines into the operations an
//! application calls. Every operation returns a [`Result`]; nothing panics
//! across this boundary.

mod compose;

pub use compose::MessageDraft;

use std::sync::Arc;

use chrono::Duration;
use maildesk_transport::{ConnectionHealth, MailTransport};
use tracing::info;

use crate::account::{Account, AccountId, validate_account};
use crate::bulk::{BulkEngine, BulkMutation, MutationReport};
use crate::contacts::Contact;
use crate::error::{Error, Result};
use crate::folder::{Folder, FolderId, FolderType, recompute_folder_counts};
use crate::message::{FlagKind, Message, MessageId, upsert_message};
use crate::rules::{NotificationSink, Rule, RuleEngine, RuleId, TracingSink};
use crate::search::MessageFilter;
use crate::store::Store;
use crate::sync::{SyncEngine, SyncOptions, SyncReport};
use crate::thread::{HEURISTIC_WINDOW_DAYS, ThreadSummary, link_message};

/// The application-facing service over one mail store.
pub struct MailService {
    store: Store,
    transport: Arc<dyn MailTransport>,
    sync: Arc<SyncEngine>,
    rules: RuleEngine,
    bulk: BulkEngine,
}

impl MailService {
    /// Create a service with rule notifications going to the tracing log.
    #[must_use]
    pub fn new(store: Store, transport: Arc<dyn MailTransport>) -> Self {
        Self::configure(
            store,
            transport,
            Arc::new(TracingSink),
            SyncOptions::default(),
        )
    }

    /// Create a fully configured service.
    #[must_use]
    pub fn configure(
        store: Store,
        transport: Arc<dyn MailTransport>,
        sink: Arc<dyn NotificationSink>,
        options: SyncOptions,
    ) -> Self {
        let sync = SyncEngine::with_sink(store.clone(), Arc::clone(&transport), Arc::clone(&sink))
            .with_options(options);
        Self {
            sync: Arc::new(sync),
            rules: RuleEngine::new(store.clone(), sink),
            bulk: BulkEngine::new(store.clone()),
            store,
            transport,
        }
    }

    /// The underlying store, for direct repository access.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    // ---- Accounts ----

    /// Validate and save a new account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming every invalid field, or a
    /// conflict when the email is already registered.
    pub async fn add_account(&self, account: &mut Account) -> Result<()> {
        check_account(account)?;
        self.store.accounts().save(account).await?;
        info!(account = %account.email, "account added");
        Ok(())
    }

    /// Validate and persist changes to an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the account was never saved or a
    /// field is invalid.
    pub async fn update_account(&self, account: &mut Account) -> Result<()> {
        if account.id.is_none() {
            return Err(Error::Validation("account has not been saved yet".into()));
        }
        check_account(account)?;
        self.store.accounts().save(account).await
    }

    /// Remove an account, its credentials, and its local mail.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the delete fails.
    pub async fn remove_account(&self, id: AccountId) -> Result<()> {
        self.store.accounts().delete(id).await
    }

    /// Fetch one account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if it does not exist.
    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.store
            .accounts()
            .get(id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// All configured accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.store.accounts().list().await
    }

    /// Make one account the single default.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist.
    pub async fn set_default_account(&self, id: AccountId) -> Result<()> {
        self.store.accounts().set_default(id).await
    }

    /// Probe the incoming server with the account's stored settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the transport
    /// cannot be reached at all; a reachable server that rejects the
    /// credentials reports failure in the returned health instead.
    pub async fn test_account_connection(&self, id: AccountId) -> Result<ConnectionHealth> {
        let account = self.get_account(id).await?;
        let health = self
            .transport
            .test_connection(&account.incoming_session())
            .await?;
        Ok(health)
    }

    // ---- Folders ----

    /// Live folders for an account, well-known roles first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_folders(&self, account_id: AccountId) -> Result<Vec<Folder>> {
        self.store.folders().list(account_id).await
    }

    /// Fetch one folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderNotFound`] if it does not exist.
    pub async fn get_folder(&self, id: FolderId) -> Result<Folder> {
        self.store
            .folders()
            .get(id)
            .await?
            .ok_or_else(|| Error::FolderNotFound(id.to_string()))
    }

    /// Create or update a folder.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate remote ids or invalid parents.
    pub async fn save_folder(&self, folder: &mut Folder) -> Result<()> {
        self.store.folders().save(folder).await
    }

    /// Soft-delete a folder and the messages in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist.
    pub async fn delete_folder(&self, id: FolderId) -> Result<()> {
        self.store.folders().soft_delete(id).await
    }

    /// Enable or disable sync for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist.
    pub async fn set_folder_sync(&self, id: FolderId, enabled: bool) -> Result<()> {
        self.store.folders().set_sync_enabled(id, enabled).await
    }

    // ---- Messages ----

    /// Fetch one message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if it does not exist.
    pub async fn get_message(&self, id: MessageId) -> Result<Message> {
        self.store
            .messages()
            .get(id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))
    }

    /// Run a composed filter query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn search_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        self.store.messages().search(filter).await
    }

    /// Count the messages a filter matches, ignoring pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_messages(&self, filter: &MessageFilter) -> Result<u64> {
        self.store.messages().count(filter).await
    }

    /// Set one flag on one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn set_message_flag(
        &self,
        id: MessageId,
        kind: FlagKind,
        value: bool,
    ) -> Result<()> {
        self.store.messages().set_flag(id, kind, value).await
    }

    /// Add labels to a message; already-present labels are kept once.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn add_message_labels(&self, id: MessageId, labels: &[String]) -> Result<Message> {
        self.store.messages().add_labels(id, labels).await
    }

    /// Remove labels from a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn remove_message_labels(&self, id: MessageId, labels: &[String]) -> Result<Message> {
        self.store.messages().remove_labels(id, labels).await
    }

    /// Assign or unassign a message to a staff member.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn assign_message(&self, id: MessageId, assignee: Option<&str>) -> Result<()> {
        self.store.messages().assign_to(id, assignee).await
    }

    /// Move a message into another folder of the same account.
    ///
    /// # Errors
    ///
    /// Returns a conflict for cross-account targets and not-found for a
    /// missing message or folder.
    pub async fn move_message(&self, id: MessageId, target: FolderId) -> Result<()> {
        self.store.messages().move_to_folder(id, target).await
    }

    /// Soft-delete a message. The row stays for thread history.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn delete_message(&self, id: MessageId) -> Result<()> {
        self.store
            .messages()
            .set_flag(id, FlagKind::Deleted, true)
            .await
    }

    /// Apply one mutation to many messages with per-message reporting.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store itself is unusable; per-item
    /// problems land in the report.
    pub async fn apply_bulk(
        &self,
        ids: &[MessageId],
        mutation: &BulkMutation,
    ) -> Result<MutationReport> {
        self.bulk.apply(ids, mutation).await
    }

    // ---- Threads ----

    /// Conversation summaries, most recent activity first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_threads(
        &self,
        account_id: AccountId,
        folder_id: Option<FolderId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadSummary>> {
        self.store
            .threads()
            .list(account_id, folder_id, limit, offset)
            .await
    }

    /// One conversation, oldest message first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_thread_messages(
        &self,
        account_id: AccountId,
        thread_id: &str,
    ) -> Result<Vec<Message>> {
        self.store
            .messages()
            .list_by_thread(account_id, thread_id)
            .await
    }

    // ---- Rules ----

    /// Every stored rule, account rules before global ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.store.rules().list().await
    }

    /// The rules that apply to one account, global rules included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn rules_for_account(&self, account_id: AccountId) -> Result<Vec<Rule>> {
        self.store.rules().list_for_account(account_id).await
    }

    /// Create or update a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty names, conditions without
    /// values, or rules with no actions.
    pub async fn save_rule(&self, rule: &mut Rule) -> Result<()> {
        self.store.rules().save(rule).await
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleNotFound`] if it does not exist.
    pub async fn delete_rule(&self, id: RuleId) -> Result<()> {
        self.store.rules().delete(id).await
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleNotFound`] if it does not exist.
    pub async fn set_rule_enabled(&self, id: RuleId, enabled: bool) -> Result<()> {
        self.store.rules().set_enabled(id, enabled).await
    }

    /// Run the applicable rules against one stored message.
    ///
    /// Returns the rules that matched and applied, in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist.
    pub async fn apply_rules(&self, message_id: MessageId) -> Result<Vec<RuleId>> {
        self.rules.apply_to_message(message_id).await
    }

    // ---- Sync ----

    /// Trigger a sync pass for one account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist; transport problems
    /// are recorded in the report and account status instead.
    pub async fn sync_account(&self, id: AccountId) -> Result<SyncReport> {
        self.sync.sync_account(id).await
    }

    /// Sync every active account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account list cannot be loaded.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        Arc::clone(&self.sync).sync_all().await
    }

    /// Request cancellation of an in-flight sync pass.
    ///
    /// Returns `true` when a pass was running.
    pub fn cancel_sync(&self, id: AccountId) -> bool {
        self.sync.cancel(id)
    }

    // ---- Compose ----

    /// Store a draft, creating it or updating the one it supersedes.
    ///
    /// The draft lands in the account's drafts folder when one exists;
    /// otherwise it is stored without a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is missing, or the superseded draft
    /// does not exist.
    pub async fn save_draft(&self, draft: &MessageDraft) -> Result<Message> {
        let account = self.get_account(draft.account_id).await?;

        let mut message = if let Some(draft_id) = draft.draft_id {
            let existing = self.get_message(draft_id).await?;
            let mut rebuilt = draft.to_message(&account, existing.message_id);
            rebuilt.folder_id = existing.folder_id;
            rebuilt
        } else {
            let mut built = draft.to_message(&account, draft.local_message_id());
            built.folder_id = self
                .store
                .folders()
                .get_by_type(draft.account_id, FolderType::Drafts)
                .await?
                .and_then(|folder| folder.id);
            built
        };
        message.flags.is_draft = true;

        self.store_composed(&mut message).await?;
        Ok(message)
    }

    /// Send a message and keep a copy in the sent folder.
    ///
    /// The copy threads with the conversation it replies to, the superseded
    /// draft (if any) is soft-deleted, and the recipients are recorded as
    /// contacts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no recipients, and a
    /// transport error when submission fails; nothing is stored in that
    /// case.
    pub async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        draft.validate_for_send()?;
        let account = self.get_account(draft.account_id).await?;

        let outgoing = draft.to_outgoing(&account);
        let remote_id = self
            .transport
            .send_message(&account.outgoing_session(), &outgoing)
            .await?;

        let mut message = draft.to_message(&account, draft.local_message_id());
        message.remote_id = Some(remote_id);
        message.flags.is_sent = true;
        message.folder_id = self
            .store
            .folders()
            .get_by_type(draft.account_id, FolderType::Sent)
            .await?
            .and_then(|folder| folder.id);

        self.store_composed(&mut message).await?;

        if let Some(draft_id) = draft.draft_id {
            self.store
                .messages()
                .set_flag(draft_id, FlagKind::Deleted, true)
                .await?;
        }

        self.store.contacts().record_from_message(&message).await?;
        info!(account = %account.email, subject = %message.subject, "message sent");
        Ok(message)
    }

    // ---- Contacts ----

    /// Known correspondents for an account, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_contacts(&self, account_id: AccountId, limit: u32) -> Result<Vec<Contact>> {
        self.store.contacts().list(account_id, limit).await
    }

    /// Prefix matches for address autocomplete.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn suggest_contacts(
        &self,
        account_id: AccountId,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<Contact>> {
        self.store.contacts().suggest(account_id, prefix, limit).await
    }

    /// Store a composed message and link it into its conversation, all in
    /// one transaction.
    async fn store_composed(&self, message: &mut Message) -> Result<()> {
        let window = Duration::days(HEURISTIC_WINDOW_DAYS);
        let mut tx = self.store.pool().begin().await?;
        upsert_message(&mut tx, message, None).await?;
        link_message(&mut tx, message, window).await?;
        if let Some(folder_id) = message.folder_id {
            recompute_folder_counts(&mut *tx, folder_id.0).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Map validation issues onto the service error type.
fn check_account(account: &Account) -> Result<()> {
    validate_account(account).map_err(|issues| {
        let detail = issues
            .iter()
            .map(|issue| issue.message())
            .collect::<Vec<_>>()
            .join("; ");
        Error::Validation(detail)
    })
}
