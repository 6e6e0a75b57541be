//! Conversation grouping and summaries.
//!
//! Threads are derived state: every message row carries a `thread_id`, the
//! grouper keeps those ids consistent as mail arrives in any order, and
//! [`ThreadRepository`] aggregates rows into list-ready summaries.

mod grouper;
mod model;
mod repository;

pub use model::ThreadSummary;
pub use repository::ThreadRepository;

pub(crate) use grouper::{HEURISTIC_WINDOW_DAYS, link_message};
