//! Per-account synchronization engine.
//!
//! One pass pulls the remote folder list, then walks the sync-enabled folders
//! in order. Each folder's messages are normalized, threaded, and stored
//! inside a single transaction together with the counter refresh and the
//! watermark advance, so a crash or cancellation never leaves a folder half
//! synced. Rule evaluation and contact recording run after commit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use maildesk_transport::{MailTransport, RawMessage, SessionConfig};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::report::{FolderOutcome, SyncReport};
use crate::account::{Account, AccountId, AccountStatus};
use crate::error::{Error, Result};
use crate::folder::{Folder, FolderId, FolderType, recompute_folder_counts, set_folder_watermark};
use crate::message::{MessageId, UpsertOutcome, normalize, upsert_message};
use crate::rules::{NotificationSink, RuleEngine};
use crate::store::Store;
use crate::thread::{HEURISTIC_WINDOW_DAYS, link_message};

/// Tuning knobs for sync passes.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Budget for one folder's fetch before it is recorded as timed out.
    pub folder_timeout: StdDuration,
    /// Budget for the whole account pass; folders beyond it are skipped.
    pub account_deadline: StdDuration,
    /// Reach of the subject heuristic when grouping threads, in days.
    pub thread_window_days: i64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            folder_timeout: StdDuration::from_secs(60),
            account_deadline: StdDuration::from_secs(300),
            thread_window_days: HEURISTIC_WINDOW_DAYS,
        }
    }
}

/// Drives sync passes over accounts.
///
/// At most one pass runs per account: a trigger while a pass is in flight
/// returns a coalesced report instead of starting a second pass. Different
/// accounts sync independently.
pub struct SyncEngine {
    store: Store,
    transport: Arc<dyn MailTransport>,
    rules: RuleEngine,
    options: SyncOptions,
    /// Cancellation flag per in-flight account pass.
    active: Mutex<HashMap<i64, Arc<AtomicBool>>>,
}

impl SyncEngine {
    /// Create an engine with rule notifications going to the tracing log.
    #[must_use]
    pub fn new(store: Store, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            rules: RuleEngine::with_tracing_sink(store.clone()),
            store,
            transport,
            options: SyncOptions::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Create an engine that reports rule events through the given sink.
    #[must_use]
    pub fn with_sink(
        store: Store,
        transport: Arc<dyn MailTransport>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            rules: RuleEngine::new(store.clone(), sink),
            store,
            transport,
            options: SyncOptions::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default timeouts and thread window.
    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<i64, Arc<AtomicBool>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the in-flight slot for an account, or `None` when a pass is
    /// already running.
    fn begin_pass(&self, account_id: AccountId) -> Option<Arc<AtomicBool>> {
        let mut active = self.lock_active();
        if active.contains_key(&account_id.0) {
            return None;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        active.insert(account_id.0, Arc::clone(&cancel));
        Some(cancel)
    }

    fn end_pass(&self, account_id: AccountId) {
        self.lock_active().remove(&account_id.0);
    }

    /// Requests cancellation of the in-flight pass for an account.
    ///
    /// Returns `true` when a pass was running. The flag is honored between
    /// folders and before each folder's transaction commits; a folder caught
    /// mid-flight rolls back rather than half-committing.
    pub fn cancel(&self, account_id: AccountId) -> bool {
        let active = self.lock_active();
        if let Some(cancel) = active.get(&account_id.0) {
            cancel.store(true, Ordering::Relaxed);
            info!(account = account_id.0, "sync cancellation requested");
            true
        } else {
            false
        }
    }

    /// Run one sync pass over an account.
    ///
    /// If a pass is already in flight for this account the call does no work
    /// and returns a report with `coalesced` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or a database operation
    /// outside the folder loop fails. Transport failures never surface here;
    /// they are recorded per folder and in the account's `last_error`.
    pub async fn sync_account(&self, account_id: AccountId) -> Result<SyncReport> {
        let account = self
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let Some(cancel) = self.begin_pass(account_id) else {
            debug!(account = %account.email, "sync already in flight, coalescing");
            return Ok(SyncReport::coalesced(account_id));
        };

        let result = self.run_pass(account_id, &account, &cancel).await;
        self.end_pass(account_id);
        result
    }

    /// Run a sync pass over every account eligible for a scheduled sweep.
    ///
    /// Inactive accounts are skipped. Each account syncs on its own task;
    /// an account whose pass fails outright is logged and left out of the
    /// returned reports rather than aborting the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the account list cannot be loaded.
    pub async fn sync_all(self: Arc<Self>) -> Result<Vec<SyncReport>> {
        let accounts = self.store.accounts().list().await?;
        let mut handles = Vec::new();
        for account in accounts {
            if account.status == AccountStatus::Inactive {
                debug!(account = %account.email, "inactive account skipped");
                continue;
            }
            let Some(account_id) = account.id else {
                continue;
            };
            let engine = Arc::clone(&self);
            handles.push(tokio::spawn(
                async move { engine.sync_account(account_id).await },
            ));
        }

        let mut reports = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => warn!(error = %err, "account sync failed"),
                Err(err) => warn!(error = %err, "account sync task aborted"),
            }
        }
        Ok(reports)
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn run_pass(
        &self,
        account_id: AccountId,
        account: &Account,
        cancel: &AtomicBool,
    ) -> Result<SyncReport> {
        let accounts = self.store.accounts();
        let deadline = Instant::now() + self.options.account_deadline;
        let mut report = SyncReport::new(account_id, Utc::now());

        accounts.begin_sync(account_id).await?;
        info!(account = %account.email, "sync pass started");

        let session = account.incoming_session();
        match self.reconcile_folders(account_id, &session).await {
            Ok(()) => {
                let folders = self.store.folders().list(account_id).await?;
                for folder in folders.into_iter().filter(|folder| folder.sync_enabled) {
                    let Some(folder_id) = folder.id else { continue };
                    if cancel.load(Ordering::Relaxed) {
                        report.cancelled = true;
                        break;
                    }
                    if Instant::now() >= deadline {
                        warn!(
                            account = %account.email,
                            folder = %folder.name,
                            "account sync deadline reached, folder skipped"
                        );
                        report.folders.push(FolderOutcome::failed(
                            folder_id,
                            &folder,
                            "skipped: account sync deadline reached",
                        ));
                        continue;
                    }

                    let outcome = self
                        .sync_folder(account, &folder, folder_id, cancel, deadline)
                        .await;
                    report.folders.push(outcome);

                    if cancel.load(Ordering::Relaxed) {
                        report.cancelled = true;
                        break;
                    }
                }
            }
            Err(err) => {
                warn!(account = %account.email, error = %err, "folder reconciliation failed");
                report.first_error = Some(err.to_string());
            }
        }

        // Rules and contacts run after the folder transactions have committed,
        // against exactly the messages this pass inserted.
        let inserted: Vec<MessageId> = report
            .folders
            .iter()
            .flat_map(|outcome| outcome.inserted_ids.iter().copied())
            .collect();
        for message_id in inserted {
            match self.rules.apply_to_message(message_id).await {
                Ok(applied) => report.rules_applied += applied.len() as u32,
                Err(err) => {
                    warn!(message = %message_id, error = %err, "rule evaluation failed");
                }
            }
            match self.store.messages().get(message_id).await {
                Ok(Some(message)) => {
                    if let Err(err) = self.store.contacts().record_from_message(&message).await {
                        warn!(message = %message_id, error = %err, "contact recording failed");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(message = %message_id, error = %err, "contact recording failed");
                }
            }
        }

        report.record_first_error();
        report.finished_at = Utc::now();

        if let Some(error) = report.first_error.clone() {
            accounts.finish_sync_error(account_id, &error).await?;
            warn!(account = %account.email, error = %error, "sync pass failed");
        } else if report.cancelled {
            // A cancelled pass is not a failure, but it did not complete
            // either: the account goes back to active without a watermark.
            accounts
                .update_status(account_id, AccountStatus::Active)
                .await?;
            info!(account = %account.email, "sync pass cancelled");
        } else {
            accounts
                .finish_sync_ok(account_id, report.finished_at)
                .await?;
            info!(
                account = %account.email,
                folders = report.folders.len(),
                inserted = report.inserted(),
                updated = report.updated(),
                rules = report.rules_applied,
                "sync pass finished"
            );
        }

        Ok(report)
    }

    /// Mirror the remote folder list into local storage.
    ///
    /// New remote folders are created with a detected role; local folders
    /// that disappeared from the server stop syncing but keep their messages.
    async fn reconcile_folders(&self, account_id: AccountId, session: &SessionConfig) -> Result<()> {
        let remote_folders = self.transport.list_folders(session).await?;
        let repo = self.store.folders();

        let mut seen = HashSet::new();
        for remote in &remote_folders {
            let folder = repo.upsert_remote(account_id, remote).await?;
            seen.insert(folder.remote_id);
        }

        for folder in repo.list(account_id).await? {
            if folder.sync_enabled
                && !seen.contains(&folder.remote_id)
                && let Some(folder_id) = folder.id
            {
                warn!(folder = %folder.name, "folder missing on server, sync disabled");
                repo.set_sync_enabled(folder_id, false).await?;
            }
        }
        Ok(())
    }

    /// Fetch and store one folder. Failures land in the outcome, not in `Err`.
    #[allow(clippy::cast_possible_truncation)]
    async fn sync_folder(
        &self,
        account: &Account,
        folder: &Folder,
        folder_id: FolderId,
        cancel: &AtomicBool,
        deadline: Instant,
    ) -> FolderOutcome {
        let mut outcome = FolderOutcome::new(folder_id, folder);
        let session = account.incoming_session();
        let watermark = folder.last_synced_at;
        let fetch_started = Utc::now();

        // The folder budget never extends past the account deadline.
        let budget = self
            .options
            .folder_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let fetch = self
            .transport
            .fetch_messages(&session, &folder.remote_id, watermark);
        let raw = match tokio::time::timeout(budget, fetch).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                warn!(folder = %folder.name, error = %err, "fetch failed");
                outcome.error = Some(err.to_string());
                return outcome;
            }
            Err(_) => {
                warn!(folder = %folder.name, budget = ?budget, "fetch timed out");
                outcome.error = Some(format!(
                    "timed out after {}s fetching {}",
                    budget.as_secs(),
                    folder.name
                ));
                return outcome;
            }
        };
        outcome.fetched = raw.len() as u32;

        match self
            .ingest(folder, folder_id, &raw, watermark, fetch_started, cancel)
            .await
        {
            Ok(Some((inserted_ids, updated))) => {
                outcome.inserted = inserted_ids.len() as u32;
                outcome.updated = updated;
                outcome.inserted_ids = inserted_ids;
                debug!(
                    folder = %folder.name,
                    fetched = outcome.fetched,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    "folder synced"
                );
            }
            Ok(None) => {
                debug!(folder = %folder.name, "folder ingest rolled back by cancellation");
            }
            Err(err) => {
                warn!(folder = %folder.name, error = %err, "folder ingest failed");
                outcome.error = Some(err.to_string());
            }
        }
        outcome
    }

    /// Store a folder's fetched messages in one transaction.
    ///
    /// Messages are normalized and threaded in arrival order; the counter
    /// refresh and watermark advance commit atomically with them. Returns
    /// `None` when cancellation rolled the transaction back.
    async fn ingest(
        &self,
        folder: &Folder,
        folder_id: FolderId,
        raw: &[RawMessage],
        watermark: Option<DateTime<Utc>>,
        fetch_started: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Result<Option<(Vec<MessageId>, u32)>> {
        let window = Duration::days(self.options.thread_window_days);
        let mut tx = self.store.pool().begin().await?;
        let mut inserted_ids = Vec::new();
        let mut updated = 0u32;

        for raw_message in raw {
            let mut message = normalize(folder.account_id, raw_message);
            message.folder_id = Some(folder_id);
            match folder.folder_type {
                FolderType::Sent => message.flags.is_sent = true,
                FolderType::Drafts => message.flags.is_draft = true,
                FolderType::Spam => message.flags.is_spam = true,
                _ => {}
            }

            match upsert_message(&mut tx, &mut message, watermark).await? {
                UpsertOutcome::Inserted => {
                    link_message(&mut tx, &mut message, window).await?;
                    if let Some(id) = message.id {
                        inserted_ids.push(id);
                    }
                }
                UpsertOutcome::Updated => updated += 1,
            }
        }

        recompute_folder_counts(&mut *tx, folder_id.0).await?;
        // The next pass picks up from when this fetch started, so messages
        // that arrived during the pass are not missed.
        set_folder_watermark(&mut *tx, folder_id.0, fetch_started).await?;

        // Dropping an uncommitted transaction rolls it back.
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some((inserted_ids, updated)))
    }
}
