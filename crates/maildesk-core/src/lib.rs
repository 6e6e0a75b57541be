//! # maildesk-core
//!
//! The multi-account inbox engine behind MailDesk: accounts, folders,
//! messages, conversation threading, search, triage rules, and a per-account
//! sync pass over any [`maildesk_transport::MailTransport`], all persisted in
//! one `SQLite` store.
//!
//! ## Features
//!
//! - **Accounts**: validated configuration, OS-keychain credential storage,
//!   and a sync status lifecycle per account
//! - **Sync engine**: coalesced, cancellable passes with per-folder
//!   transactions, timeouts, and watermark-based incremental fetch
//! - **Threading**: fetched and sent mail is grouped into conversations by
//!   correlation headers, with a subject-window fallback
//! - **Search**: one composable filter type covering flags, labels,
//!   assignment, date ranges, and free text
//! - **Rules and bulk edits**: condition/action triage rules and batch
//!   mutations, both with per-item reporting
//! - **Compose**: drafts and sent copies stored through the same pipeline as
//!   fetched mail, so replies thread correctly
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use maildesk_core::{Account, MailService, Store};
//! use maildesk_transport::InMemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> maildesk_core::Result<()> {
//!     let store = Store::in_memory().await?;
//!     let service = MailService::new(store, Arc::new(InMemoryTransport::new()));
//!
//!     let mut account = Account::with_email("studio@example.com");
//!     account.secret = "app-password".into();
//!     service.add_account(&mut account).await?;
//!
//!     let report = service.sync_account(account.id.unwrap()).await?;
//!     println!("synced {} new messages", report.inserted());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`account`]: Account configuration, validation, and credentials
//! - [`folder`]: Folder hierarchy with cached counters
//! - [`message`]: Message storage, normalization, and flag reconciliation
//! - [`thread`]: Conversation grouping and summaries
//! - [`sync`]: The per-account sync engine
//! - [`search`]: Declarative message filtering
//! - [`rules`]: Condition/action triage rules
//! - [`bulk`]: Batch mutations with per-item outcomes
//! - [`contacts`]: Correspondent tracking for autocomplete
//! - [`service`]: The high-level [`MailService`] facade
//! - [`store`]: The shared `SQLite` store
//! - [`logging`]: Tracing setup helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod bulk;
pub mod contacts;
mod error;
pub mod folder;
pub mod logging;
pub mod message;
pub mod rules;
pub mod search;
pub mod service;
pub mod store;
pub mod sync;
pub mod thread;

pub use account::credentials;
pub use account::{
    Account, AccountId, AccountRepository, AccountStatus, CredentialError, CredentialResult,
    ProviderKind, ServerConfig, ValidationError, ValidationResult, validate_account,
};
pub use bulk::{BulkEngine, BulkMutation, MutationFailure, MutationReport};
pub use contacts::{Contact, ContactId, ContactRepository};
pub use error::{Error, Result};
pub use folder::{Folder, FolderId, FolderRepository, FolderType};
pub use message::{
    Attachment, FlagKind, Message, MessageFlags, MessageId, MessageRepository, UpsertOutcome,
};
pub use rules::{
    Action, ChannelSink, Condition, MessageField, NotificationSink, Rule, RuleEngine, RuleEvent,
    RuleEventKind, RuleId, RuleRepository, TracingSink,
};
pub use search::{MessageFilter, SortKey};
pub use service::{MailService, MessageDraft};
pub use store::Store;
pub use sync::{FolderOutcome, SyncEngine, SyncOptions, SyncReport};
pub use thread::{ThreadRepository, ThreadSummary};
