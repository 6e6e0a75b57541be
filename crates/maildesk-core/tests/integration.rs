//! End-to-end tests through the public service API.
//!
//! Each test drives a [`MailService`] over an in-memory store and a scripted
//! transport: mail is fetched, normalized, threaded, and triaged exactly as
//! it would be against a real server, minus the network.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use maildesk_core::{
    Account, AccountId, AccountStatus, Action, BulkMutation, ChannelSink, Condition, FlagKind,
    MailService, MessageDraft, MessageField, MessageFilter, MessageId, Rule, RuleEventKind,
    ServerConfig, Store, SyncOptions,
};
use maildesk_transport::{InMemoryTransport, MailTransport, RawMessage, RemoteFolder, Security};

const USER: &str = "studio@lenswork.example";

fn studio_account() -> Account {
    let mut account = Account::with_email(USER);
    account.secret = "app-password".into();
    account.incoming = ServerConfig {
        host: "mail.lenswork.example".into(),
        port: 993,
        security: Security::Tls,
    };
    account.outgoing = ServerConfig {
        host: "mail.lenswork.example".into(),
        port: 465,
        security: Security::Tls,
    };
    account
}

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
}

fn raw(remote_id: &str, message_id: &str, from: &str, subject: &str, hour: u32) -> RawMessage {
    RawMessage::new(remote_id, message_id, from, subject, at(hour))
        .with_to(vec![USER.to_string()])
        .with_body_text(format!("Body of {subject}"))
}

/// A service over one account. Tests seed the transport's folders first;
/// `add_message` creates INBOX implicitly.
async fn fixture(transport: Arc<InMemoryTransport>) -> (MailService, AccountId) {
    let store = Store::in_memory().await.unwrap();
    let service = MailService::new(store, transport);
    let mut account = studio_account();
    service.add_account(&mut account).await.unwrap();
    (service, account.id.unwrap())
}

#[tokio::test]
async fn synced_mailbox_is_grouped_searchable_and_counted() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<quote@client>", "anna@client.example", "Wedding quote", 9),
    );
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-2", "<quote-2@client>", "anna@client.example", "Re: Wedding quote", 10)
            .with_in_reply_to("<quote@client>")
            .with_references(vec!["<quote@client>".to_string()]),
    );
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-3", "<print@lab>", "lab@prints.example", "Print order ready", 11),
    );

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    let report = service.sync_account(account_id).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.inserted(), 3);

    // Two messages share a correlation chain, the third stands alone.
    let threads = service.list_threads(account_id, None, 50, 0).await.unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].subject, "Print order ready");
    assert_eq!(threads[1].message_count, 2);
    assert!(threads[1].participants.contains(&"anna@client.example".to_string()));

    // The folder counters reflect the ingest.
    let folders = service.list_folders(account_id).await.unwrap();
    let inbox = folders.iter().find(|f| f.remote_id == "INBOX").unwrap();
    assert_eq!(inbox.total_count, 3);
    assert_eq!(inbox.unread_count, 3);

    // Free text finds the standalone message.
    let hits = service
        .search_messages(&MessageFilter::for_account(account_id).matching("print order"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].from_email, "lab@prints.example");

    // Senders were recorded for autocomplete.
    let suggestions = service.suggest_contacts(account_id, "anna", 5).await.unwrap();
    assert_eq!(suggestions.len(), 1);
}

#[tokio::test]
async fn rules_triage_new_mail_and_stop_on_first_match() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<inv@client>", "anna@client.example", "Invoice 44", 9),
    );

    let store = Store::in_memory().await.unwrap();
    let (sink, mut events) = ChannelSink::channel();
    let dyn_transport: Arc<dyn MailTransport> = Arc::<InMemoryTransport>::clone(&transport);
    let service = MailService::configure(
        store,
        dyn_transport,
        Arc::new(sink),
        SyncOptions::default(),
    );
    let mut account = studio_account();
    service.add_account(&mut account).await.unwrap();
    let account_id = account.id.unwrap();

    let mut billing = Rule::new("Billing");
    billing.account_id = Some(account_id);
    billing.priority = 10;
    billing.stop_on_first_match = true;
    billing.conditions = vec![Condition::FieldContains {
        field: MessageField::Subject,
        value: "invoice".into(),
    }];
    billing.actions = vec![
        Action::AddLabels {
            labels: vec!["billing".into()],
        },
        Action::Notify,
    ];
    service.save_rule(&mut billing).await.unwrap();

    let mut followup = Rule::new("Follow up");
    followup.account_id = Some(account_id);
    followup.conditions = vec![Condition::FieldContains {
        field: MessageField::Subject,
        value: "invoice".into(),
    }];
    followup.actions = vec![Action::AddLabels {
        labels: vec!["followup".into()],
    }];
    service.save_rule(&mut followup).await.unwrap();

    let report = service.sync_account(account_id).await.unwrap();
    assert_eq!(report.rules_applied, 1);

    let hits = service
        .search_messages(&MessageFilter::for_account(account_id))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].has_label("billing"));
    // The lower-priority rule never ran.
    assert!(!hits[0].has_label("followup"));

    // Notify fires while the actions run, the match event after them.
    let first = events.recv().await.unwrap();
    assert_eq!(first.kind, RuleEventKind::Notify);
    let second = events.recv().await.unwrap();
    assert_eq!(second.kind, RuleEventKind::Matched);
}

#[tokio::test]
async fn one_bad_folder_does_not_block_the_rest() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<quote@client>", "anna@client.example", "Wedding quote", 9),
    );
    transport.add_folder(USER, RemoteFolder::new("Sent", "Sent"));
    transport.fail_fetch(USER, "Sent", "socket reset by peer");

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    let report = service.sync_account(account_id).await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.inserted(), 1);
    let failed = report.folders.iter().find(|f| f.name == "Sent").unwrap();
    assert!(failed.error.as_deref().unwrap().contains("socket reset"));

    // The account shows the failure but the fetched mail is usable.
    let account = service.get_account(account_id).await.unwrap();
    assert_eq!(account.status, AccountStatus::Error);
    assert!(account.last_error.as_deref().unwrap().contains("socket reset"));

    let hits = service
        .search_messages(&MessageFilter::for_account(account_id))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn second_pass_only_picks_up_new_mail() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<quote@client>", "anna@client.example", "Wedding quote", 9),
    );

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    service.sync_account(account_id).await.unwrap();

    // Arrives after the first pass; dated past the watermark.
    transport.add_message(
        USER,
        "INBOX",
        RawMessage::new(
            "uid-2",
            "<quote-2@client>",
            "anna@client.example",
            "Re: Wedding quote",
            Utc::now() + Duration::minutes(5),
        )
        .with_in_reply_to("<quote@client>"),
    );

    let second = service.sync_account(account_id).await.unwrap();
    assert_eq!(second.folders[0].fetched, 1);
    assert_eq!(second.inserted(), 1);

    // The reply joined the existing conversation instead of opening one.
    let threads = service.list_threads(account_id, None, 50, 0).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].message_count, 2);
}

#[tokio::test]
async fn bulk_edits_report_each_message() {
    let transport = Arc::new(InMemoryTransport::new());
    for n in 1..=3 {
        transport.add_message(
            USER,
            "INBOX",
            raw(
                &format!("uid-{n}"),
                &format!("<m{n}@client>"),
                "anna@client.example",
                &format!("Shoot {n}"),
                8 + n,
            ),
        );
    }

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    service.sync_account(account_id).await.unwrap();

    let mut ids: Vec<MessageId> = service
        .search_messages(&MessageFilter::for_account(account_id))
        .await
        .unwrap()
        .iter()
        .filter_map(|m| m.id)
        .collect();
    ids.push(MessageId::new(9999));

    let report = service
        .apply_bulk(
            &ids,
            &BulkMutation::SetFlag {
                flag: FlagKind::Read,
                value: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, MessageId::new(9999));

    let unread = service
        .count_messages(&MessageFilter::for_account(account_id).unread())
        .await
        .unwrap();
    assert_eq!(unread, 0);

    let folders = service.list_folders(account_id).await.unwrap();
    let inbox = folders.iter().find(|f| f.remote_id == "INBOX").unwrap();
    assert_eq!(inbox.unread_count, 0);
}

#[tokio::test]
async fn replying_to_synced_mail_extends_its_conversation() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<quote@client>", "anna@client.example", "Wedding quote", 9),
    );
    transport.add_folder(USER, RemoteFolder::new("Sent", "Sent"));

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    service.sync_account(account_id).await.unwrap();

    let inbound = service
        .search_messages(&MessageFilter::for_account(account_id))
        .await
        .unwrap()
        .remove(0);

    let reply = MessageDraft::reply_to(account_id, &inbound).body_text("Happy to hold the date.");
    let sent = service.send_message(&reply).await.unwrap();

    assert!(sent.flags.is_sent);
    assert_eq!(sent.thread_id, inbound.thread_id);
    assert_eq!(transport.sent_messages().len(), 1);

    let threads = service.list_threads(account_id, None, 50, 0).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].message_count, 2);
    assert_eq!(threads[0].subject, "Wedding quote");

    // The sent copy landed in the reconciled Sent folder.
    let folders = service.list_folders(account_id).await.unwrap();
    let sent_folder = folders.iter().find(|f| f.remote_id == "Sent").unwrap();
    assert_eq!(sent_folder.total_count, 1);
}

#[tokio::test]
async fn moving_mail_keeps_both_folder_counts_honest() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.add_message(
        USER,
        "INBOX",
        raw("uid-1", "<quote@client>", "anna@client.example", "Wedding quote", 9),
    );
    transport.add_folder(USER, RemoteFolder::new("Archive", "Archive"));

    let (service, account_id) = fixture(Arc::clone(&transport)).await;
    service.sync_account(account_id).await.unwrap();

    let folders = service.list_folders(account_id).await.unwrap();
    let inbox_id = folders.iter().find(|f| f.remote_id == "INBOX").unwrap().id.unwrap();
    let archive_id = folders.iter().find(|f| f.remote_id == "Archive").unwrap().id.unwrap();

    let message = service
        .search_messages(&MessageFilter::for_account(account_id))
        .await
        .unwrap()
        .remove(0);
    service.move_message(message.id.unwrap(), archive_id).await.unwrap();

    let folders = service.list_folders(account_id).await.unwrap();
    let inbox = folders.iter().find(|f| f.id == Some(inbox_id)).unwrap();
    let archive = folders.iter().find(|f| f.id == Some(archive_id)).unwrap();
    assert_eq!(inbox.total_count, 0);
    assert_eq!(archive.total_count, 1);

    let in_archive = service
        .search_messages(&MessageFilter::for_folder(account_id, archive_id))
        .await
        .unwrap();
    assert_eq!(in_archive.len(), 1);
}
