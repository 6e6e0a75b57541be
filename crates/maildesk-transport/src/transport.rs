//! The adapter contract between the inbox core and a mail server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{ConnectionHealth, OutgoingMessage, RawMessage, RemoteFolder, SessionConfig};

/// Per-provider mail server client.
///
/// Implementations own the wire protocol (IMAP, JMAP, a vendor HTTP API);
/// the core only sees folders and raw messages. All methods are suspension
/// points — callers wrap them in their own timeouts.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Probe the server with the given configuration.
    ///
    /// Reachability and authentication problems are reported inside
    /// [`ConnectionHealth`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only for local failures (e.g. the adapter itself is
    /// misconfigured), never for server-side rejection.
    async fn test_connection(&self, config: &SessionConfig) -> Result<ConnectionHealth>;

    /// List the folders the server exposes for this mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or the session cannot
    /// be established.
    async fn list_folders(&self, config: &SessionConfig) -> Result<Vec<RemoteFolder>>;

    /// Fetch messages from one folder, newer than the given watermark.
    ///
    /// `since = None` means a full fetch. Adapters may additionally return
    /// older messages whose flags changed; the core's upsert makes re-fetch
    /// idempotent. Messages are returned in the order the server yields
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be opened or the fetch fails.
    async fn fetch_messages(
        &self,
        config: &SessionConfig,
        folder_remote_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>>;

    /// Submit a composed message and return its transport-layer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the message or the session
    /// cannot be established.
    async fn send_message(
        &self,
        config: &SessionConfig,
        message: &OutgoingMessage,
    ) -> Result<String>;
}
