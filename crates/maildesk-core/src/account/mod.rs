//! Account management module.
//!
//! Provides account configuration, storage, validation, and credential
//! handling.

pub mod credentials;
mod model;
mod repository;
mod validation;

pub use credentials::{CredentialError, CredentialResult};
pub use model::{Account, AccountId, AccountStatus, ProviderKind, ServerConfig};
pub use repository::AccountRepository;
pub use validation::{ValidationError, ValidationResult, validate_account};
