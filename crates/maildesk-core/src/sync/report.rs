//! Outcome reporting for sync passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::folder::{Folder, FolderId};
use crate::message::MessageId;

/// What happened to one folder during a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderOutcome {
    /// Local folder id.
    pub folder_id: FolderId,
    /// Folder display name at the time of the pass.
    pub name: String,
    /// Messages the transport returned for this folder.
    pub fetched: u32,
    /// Messages stored for the first time.
    pub inserted: u32,
    /// Messages already present that were refreshed in place.
    pub updated: u32,
    /// Ids of the newly inserted messages, in arrival order.
    pub inserted_ids: Vec<MessageId>,
    /// Failure description if the folder did not complete.
    pub error: Option<String>,
}

impl FolderOutcome {
    pub(crate) fn new(folder_id: FolderId, folder: &Folder) -> Self {
        Self {
            folder_id,
            name: folder.name.clone(),
            fetched: 0,
            inserted: 0,
            updated: 0,
            inserted_ids: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn failed(folder_id: FolderId, folder: &Folder, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(folder_id, folder)
        }
    }

    /// Whether this folder synced without error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one sync pass over an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// The account that was synced.
    pub account_id: AccountId,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass finished.
    pub finished_at: DateTime<Utc>,
    /// Per-folder outcomes, in the order folders were visited.
    pub folders: Vec<FolderOutcome>,
    /// Rules that fired against newly inserted messages.
    pub rules_applied: u32,
    /// `true` when a pass was already running and this call did no work.
    pub coalesced: bool,
    /// `true` when the pass was cancelled before visiting every folder.
    pub cancelled: bool,
    /// First failure encountered, if any.
    pub first_error: Option<String>,
}

impl SyncReport {
    pub(crate) fn new(account_id: AccountId, started_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            started_at,
            finished_at: started_at,
            folders: Vec::new(),
            rules_applied: 0,
            coalesced: false,
            cancelled: false,
            first_error: None,
        }
    }

    pub(crate) fn coalesced(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            coalesced: true,
            ..Self::new(account_id, now)
        }
    }

    /// Whether every visited folder completed and nothing was cut short.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.first_error.is_none() && self.folders.iter().all(FolderOutcome::is_ok)
    }

    /// Total messages stored for the first time across all folders.
    #[must_use]
    pub fn inserted(&self) -> u32 {
        self.folders.iter().map(|outcome| outcome.inserted).sum()
    }

    /// Total messages refreshed in place across all folders.
    #[must_use]
    pub fn updated(&self) -> u32 {
        self.folders.iter().map(|outcome| outcome.updated).sum()
    }

    pub(crate) fn record_first_error(&mut self) {
        if self.first_error.is_none() {
            self.first_error = self
                .folders
                .iter()
                .find_map(|outcome| outcome.error.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn folder(name: &str) -> Folder {
        Folder::new(AccountId::new(1), name, name)
    }

    #[test]
    fn clean_report_requires_every_folder_ok() {
        let mut report = SyncReport::new(AccountId::new(1), Utc::now());
        report
            .folders
            .push(FolderOutcome::new(FolderId::new(1), &folder("INBOX")));
        assert!(report.is_clean());

        report.folders.push(FolderOutcome::failed(
            FolderId::new(2),
            &folder("Sent"),
            "socket reset",
        ));
        report.record_first_error();
        assert!(!report.is_clean());
        assert_eq!(report.first_error.as_deref(), Some("socket reset"));
    }

    #[test]
    fn totals_sum_over_folders() {
        let mut report = SyncReport::new(AccountId::new(1), Utc::now());
        let mut inbox = FolderOutcome::new(FolderId::new(1), &folder("INBOX"));
        inbox.inserted = 3;
        inbox.updated = 1;
        let mut sent = FolderOutcome::new(FolderId::new(2), &folder("Sent"));
        sent.inserted = 2;
        report.folders.push(inbox);
        report.folders.push(sent);

        assert_eq!(report.inserted(), 5);
        assert_eq!(report.updated(), 1);
    }

    #[test]
    fn first_error_sticks_once_set() {
        let mut report = SyncReport::new(AccountId::new(1), Utc::now());
        report.first_error = Some("folder listing failed".into());
        report.folders.push(FolderOutcome::failed(
            FolderId::new(1),
            &folder("INBOX"),
            "later failure",
        ));
        report.record_first_error();
        assert_eq!(report.first_error.as_deref(), Some("folder listing failed"));
    }

    #[test]
    fn coalesced_report_did_no_work() {
        let report = SyncReport::coalesced(AccountId::new(7));
        assert!(report.coalesced);
        assert!(report.folders.is_empty());
        assert_eq!(report.inserted(), 0);
    }
}
