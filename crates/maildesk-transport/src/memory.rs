//! In-memory transport for tests and offline development.
//!
//! Mailboxes are scripted per username: seed folders and raw messages, then
//! point the sync engine at this transport. Fetch failures and delays can be
//! injected per folder to exercise error and timeout paths.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::transport::MailTransport;
use crate::types::{ConnectionHealth, OutgoingMessage, RawMessage, RemoteFolder, SessionConfig};

#[derive(Default)]
struct MailboxState {
    /// Folders per username.
    folders: HashMap<String, Vec<RemoteFolder>>,
    /// Messages per (username, folder remote id).
    messages: HashMap<(String, String), Vec<RawMessage>>,
    /// Scripted fetch failures per (username, folder remote id).
    failures: HashMap<(String, String), String>,
    /// Scripted fetch delays per (username, folder remote id).
    delays: HashMap<(String, String), Duration>,
    /// Captured outgoing messages.
    sent: Vec<OutgoingMessage>,
    /// When set, every session-opening call fails.
    refuse_connections: bool,
    /// Counter for generated remote ids.
    next_sent_id: u64,
}

/// A scripted mail server held entirely in memory.
#[derive(Default)]
pub struct InMemoryTransport {
    state: Mutex<MailboxState>,
}

impl InMemoryTransport {
    /// Creates an empty transport with no mailboxes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a folder for the given username.
    pub fn add_folder(&self, username: &str, folder: RemoteFolder) {
        self.lock()
            .folders
            .entry(username.to_string())
            .or_default()
            .push(folder);
    }

    /// Seeds a message; the folder is created if it does not exist yet.
    pub fn add_message(&self, username: &str, folder_remote_id: &str, message: RawMessage) {
        let mut state = self.lock();
        let known = state
            .folders
            .get(username)
            .is_some_and(|folders| folders.iter().any(|f| f.remote_id == folder_remote_id));
        if !known {
            state
                .folders
                .entry(username.to_string())
                .or_default()
                .push(RemoteFolder::new(folder_remote_id, folder_remote_id));
        }
        state
            .messages
            .entry((username.to_string(), folder_remote_id.to_string()))
            .or_default()
            .push(message);
    }

    /// Scripts a connection failure for every fetch from one folder.
    pub fn fail_fetch(&self, username: &str, folder_remote_id: &str, reason: &str) {
        self.lock().failures.insert(
            (username.to_string(), folder_remote_id.to_string()),
            reason.to_string(),
        );
    }

    /// Scripts a delay before fetches from one folder return.
    pub fn delay_fetch(&self, username: &str, folder_remote_id: &str, delay: Duration) {
        self.lock()
            .delays
            .insert((username.to_string(), folder_remote_id.to_string()), delay);
    }

    /// When `true`, every session-opening call fails with a connection error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Returns a copy of everything submitted through [`MailTransport::send_message`].
    #[must_use]
    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.lock().sent.clone()
    }
}

#[async_trait]
impl MailTransport for InMemoryTransport {
    async fn test_connection(&self, config: &SessionConfig) -> Result<ConnectionHealth> {
        let state = self.lock();
        if state.refuse_connections {
            return Ok(ConnectionHealth::failed("connection refused"));
        }
        if config.secret.is_empty() {
            return Ok(ConnectionHealth::failed("missing credentials"));
        }
        Ok(ConnectionHealth::ok("in-memory server ready"))
    }

    async fn list_folders(&self, config: &SessionConfig) -> Result<Vec<RemoteFolder>> {
        let state = self.lock();
        if state.refuse_connections {
            return Err(TransportError::Connection("connection refused".into()));
        }
        Ok(state
            .folders
            .get(&config.username)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_messages(
        &self,
        config: &SessionConfig,
        folder_remote_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>> {
        let key = (config.username.clone(), folder_remote_id.to_string());
        let delay = {
            let state = self.lock();
            if state.refuse_connections {
                return Err(TransportError::Connection("connection refused".into()));
            }
            state.delays.get(&key).copied()
        };

        // Sleep outside the lock so concurrent fetches stay independent.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if let Some(reason) = state.failures.get(&key) {
            return Err(TransportError::Connection(reason.clone()));
        }

        let messages = state
            .messages
            .get(&key)
            .map(|all| {
                all.iter()
                    .filter(|m| since.is_none_or(|cutoff| m.date > cutoff))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!(
            folder = folder_remote_id,
            count = messages.len(),
            "in-memory fetch"
        );
        Ok(messages)
    }

    async fn send_message(
        &self,
        config: &SessionConfig,
        message: &OutgoingMessage,
    ) -> Result<String> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(TransportError::Connection("connection refused".into()));
        }
        if message.to.is_empty() && message.cc.is_empty() {
            return Err(TransportError::Rejected("no recipients".into()));
        }
        state.next_sent_id += 1;
        let remote_id = format!("sent-{}-{}", config.username, state.next_sent_id);
        state.sent.push(message.clone());
        Ok(remote_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(username: &str) -> SessionConfig {
        SessionConfig {
            host: "mail.example.com".into(),
            port: 993,
            username: username.into(),
            secret: "secret".into(),
            ..SessionConfig::default()
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn fetch_honors_watermark() {
        let transport = InMemoryTransport::new();
        transport.add_message(
            "me",
            "INBOX",
            RawMessage::new("r1", "<m1@x>", "a@x", "old", at(8)),
        );
        transport.add_message(
            "me",
            "INBOX",
            RawMessage::new("r2", "<m2@x>", "a@x", "new", at(12)),
        );

        let all = transport
            .fetch_messages(&config("me"), "INBOX", None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let newer = transport
            .fetch_messages(&config("me"), "INBOX", Some(at(9)))
            .await
            .unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].remote_id, "r2");
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_connection_error() {
        let transport = InMemoryTransport::new();
        transport.add_message(
            "me",
            "Sent",
            RawMessage::new("r1", "<m1@x>", "a@x", "hi", at(8)),
        );
        transport.fail_fetch("me", "Sent", "socket reset");

        let err = transport
            .fetch_messages(&config("me"), "Sent", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn implicit_folder_creation_on_seed() {
        let transport = InMemoryTransport::new();
        transport.add_message(
            "me",
            "Archive",
            RawMessage::new("r1", "<m1@x>", "a@x", "hi", at(8)),
        );

        let folders = transport.list_folders(&config("me")).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].remote_id, "Archive");
    }

    #[tokio::test]
    async fn send_captures_message_and_generates_remote_id() {
        let transport = InMemoryTransport::new();
        let out = OutgoingMessage {
            from: "me@x".into(),
            to: vec!["you@x".into()],
            subject: "hello".into(),
            ..OutgoingMessage::default()
        };

        let id = transport.send_message(&config("me"), &out).await.unwrap();
        assert!(id.starts_with("sent-me-"));
        assert_eq!(transport.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn send_without_recipients_is_rejected() {
        let transport = InMemoryTransport::new();
        let out = OutgoingMessage {
            from: "me@x".into(),
            subject: "empty".into(),
            ..OutgoingMessage::default()
        };
        let err = transport
            .send_message(&config("me"), &out)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }

    #[tokio::test]
    async fn refused_connections_fail_probe_and_fetch() {
        let transport = InMemoryTransport::new();
        transport.refuse_connections(true);

        let health = transport.test_connection(&config("me")).await.unwrap();
        assert!(!health.success);

        let err = transport.list_folders(&config("me")).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
