//! Account synchronization.
//!
//! [`SyncEngine`] pulls mail through a [`maildesk_transport::MailTransport`],
//! one pass per account, one transaction per folder. Passes coalesce while
//! one is in flight and can be cancelled between folder commits.

mod engine;
mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use report::{FolderOutcome, SyncReport};
