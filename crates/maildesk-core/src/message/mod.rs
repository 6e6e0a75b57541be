//! Message storage, normalization, and flag reconciliation.
//!
//! Fetched messages pass through [`normalize`] before they are stored, so
//! everything downstream (threading, search, rules) sees one canonical shape
//! regardless of provider quirks.

mod model;
mod normalize;
mod repository;

pub use model::{Attachment, FlagKind, Message, MessageFlags, MessageId};
pub use normalize::{clean_message_id, normalize, normalize_subject, parse_address};
pub use repository::{MessageRepository, UpsertOutcome};

pub(crate) use normalize::normalize_label_set;
pub(crate) use repository::{
    find_by_any_message_id, reassign_thread, referencing_candidates, subject_candidates,
    thread_extent, upsert_message,
};
