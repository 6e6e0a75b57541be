//! # maildesk-transport
//!
//! The mail server boundary for MailDesk: a provider-neutral [`MailTransport`]
//! trait plus the data that crosses it, and an in-memory implementation for
//! tests and offline development.
//!
//! ## Features
//!
//! - **Provider-neutral contract**: folder listing, incremental message fetch,
//!   connection probing, and message submission behind one async trait
//! - **Raw wire types**: [`RawMessage`] and friends carry exactly what a server
//!   hands back, before any normalization or storage
//! - **Scripted test double**: [`InMemoryTransport`] with per-folder failure
//!   and delay injection
//!
//! ## Quick Start
//!
//! ```ignore
//! use maildesk_transport::{InMemoryTransport, MailTransport, RawMessage, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> maildesk_transport::Result<()> {
//!     let transport = InMemoryTransport::new();
//!     transport.add_message(
//!         "user@example.com",
//!         "INBOX",
//!         RawMessage::new("uid-1", "<hello@example.com>", "friend@example.com",
//!                         "Hello", chrono::Utc::now()),
//!     );
//!
//!     let config = SessionConfig {
//!         host: "mail.example.com".into(),
//!         port: 993,
//!         username: "user@example.com".into(),
//!         secret: "app-password".into(),
//!         ..SessionConfig::default()
//!     };
//!
//!     let messages = transport.fetch_messages(&config, "INBOX", None).await?;
//!     println!("fetched {}", messages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`transport`]: The [`MailTransport`] trait
//! - [`types`]: Session configuration and raw wire types
//! - [`memory`]: Scripted in-memory implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod memory;
pub mod transport;
pub mod types;

pub use error::{Result, TransportError};
pub use memory::InMemoryTransport;
pub use transport::MailTransport;
pub use types::{
    ConnectionHealth, OutgoingMessage, RawAttachment, RawMessage, RemoteFolder, Security,
    SessionConfig,
};
