//! Correspondent tracking.
//!
//! Every synced message feeds the contact list, which ranks addresses by
//! how often they appear for compose-time autocomplete.

mod model;
mod repository;

pub use model::{Contact, ContactId};
pub use repository::ContactRepository;
