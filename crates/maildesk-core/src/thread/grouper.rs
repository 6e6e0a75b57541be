use std::collections::{BTreeSet, HashSet};

use chrono::Duration;
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::account::AccountId;
use crate::error::Result;
use crate::message::{
    Message, find_by_any_message_id, reassign_thread, referencing_candidates, subject_candidates,
    thread_extent,
};

/// Default reach of the subject heuristic, in days around the message date.
pub(crate) const HEURISTIC_WINDOW_DAYS: i64 = 7;

/// Resolves the conversation for a freshly stored message.
///
/// Header correlation wins: if the message references a stored message, or a
/// stored message references it, their threads join. Otherwise a bounded
/// subject-and-participants heuristic applies, and failing that the message
/// stays a singleton thread under its own id. Runs inside the caller's
/// transaction.
pub(crate) async fn link_message(
    conn: &mut SqliteConnection,
    message: &mut Message,
    window: Duration,
) -> Result<String> {
    let account_id = message.account_id;
    let correlation: Vec<String> = message
        .correlation_ids()
        .into_iter()
        .map(ToString::to_string)
        .collect();

    let mut related = find_by_any_message_id(&mut *conn, account_id, &correlation).await?;
    related.extend(referencing_candidates(&mut *conn, account_id, &message.message_id).await?);

    let mut threads: BTreeSet<String> = related
        .iter()
        .filter(|other| other.id != message.id)
        .map(|other| other.thread_id.clone())
        .collect();

    if threads.is_empty()
        && let Some(adopted) = heuristic_thread(&mut *conn, message, window).await?
    {
        threads.insert(adopted);
    }

    if threads.is_empty() {
        return Ok(message.thread_id.clone());
    }

    threads.insert(message.thread_id.clone());
    let winner = merge_threads(&mut *conn, account_id, &threads).await?;
    message.thread_id.clone_from(&winner);
    Ok(winner)
}

async fn heuristic_thread(
    conn: &mut SqliteConnection,
    message: &Message,
    window: Duration,
) -> Result<Option<String>> {
    if message.normalized_subject.is_empty() {
        return Ok(None);
    }
    let candidates = subject_candidates(
        conn,
        message.account_id,
        &message.normalized_subject,
        message.date_received,
        window,
    )
    .await?;
    Ok(candidates
        .iter()
        .filter(|other| other.id != message.id)
        .find(|other| participants_overlap(message, other))
        .map(|other| other.thread_id.clone()))
}

fn participants_overlap(a: &Message, b: &Message) -> bool {
    let mine: HashSet<&str> = a.participants().into_iter().collect();
    b.participants().into_iter().any(|address| mine.contains(address))
}

/// Collapses the given threads into one, returning the surviving id.
///
/// Larger threads absorb smaller ones; ties go to the conversation holding
/// the earlier message, then the smaller id. The outcome does not depend on
/// merge order.
async fn merge_threads(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    threads: &BTreeSet<String>,
) -> Result<String> {
    let mut extents = Vec::with_capacity(threads.len());
    for thread_id in threads {
        if let Some((size, earliest)) = thread_extent(&mut *conn, account_id, thread_id).await? {
            extents.push((thread_id.clone(), size, earliest));
        }
    }
    let winner = extents
        .iter()
        .max_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| b.0.cmp(&a.0))
        })
        .map(|(thread_id, _, _)| thread_id.clone());
    let Some(winner) = winner else {
        return Ok(threads.iter().next().cloned().unwrap_or_default());
    };

    for thread_id in threads {
        if *thread_id != winner {
            let moved = reassign_thread(&mut *conn, account_id, thread_id, &winner).await?;
            if moved > 0 {
                debug!(from = %thread_id, to = %winner, moved, "merged conversation");
            }
        }
    }
    Ok(winner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::{normalize_subject, upsert_message};
    use crate::store::Store;
    use chrono::{DateTime, TimeZone, Utc};

    fn window() -> Duration {
        Duration::days(HEURISTIC_WINDOW_DAYS)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    fn message(id: &str, from: &str, subject: &str, day: u32) -> Message {
        let mut message = Message::new(
            AccountId::new(1),
            format!("<{id}@example.com>"),
            from,
            subject,
            at(day),
        );
        message.normalized_subject = normalize_subject(subject);
        message.to_emails = vec!["studio@example.com".to_string()];
        message
    }

    async fn ingest(conn: &mut SqliteConnection, message: &mut Message) -> String {
        upsert_message(&mut *conn, message, None).await.unwrap();
        link_message(&mut *conn, message, window()).await.unwrap()
    }

    async fn thread_size(store: &Store, thread_id: &str) -> usize {
        store
            .messages()
            .list_by_thread(AccountId::new(1), thread_id)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn reply_joins_the_parent_thread() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut parent = message("p", "client@example.com", "Shoot list", 1);
        let parent_thread = ingest(&mut conn, &mut parent).await;

        let mut reply = message("r", "studio@example.com", "Re: Shoot list", 2);
        reply.in_reply_to = Some("<p@example.com>".to_string());
        let reply_thread = ingest(&mut conn, &mut reply).await;
        // Release the single pooled connection so `thread_size` can acquire it.
        drop(conn);

        assert_eq!(reply_thread, parent_thread);
        assert_eq!(thread_size(&store, &parent_thread).await, 2);
    }

    #[tokio::test]
    async fn reply_arriving_first_merges_when_the_parent_lands() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut reply = message("r", "studio@example.com", "Re: Album picks", 2);
        reply.references = vec!["<p@example.com>".to_string()];
        let orphan_thread = ingest(&mut conn, &mut reply).await;
        assert_eq!(orphan_thread, "<r@example.com>");

        let mut parent = message("p", "client@example.com", "Album picks", 1);
        let settled = ingest(&mut conn, &mut parent).await;
        // Release the single pooled connection so `thread_size` can acquire it.
        drop(conn);

        // Equal sizes: the thread holding the earlier message survives.
        assert_eq!(settled, "<p@example.com>");
        assert_eq!(thread_size(&store, "<p@example.com>").await, 2);
        assert_eq!(thread_size(&store, "<r@example.com>").await, 0);
    }

    #[tokio::test]
    async fn subject_heuristic_groups_related_mail() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut first = message("a", "client@example.com", "Mini sessions", 1);
        let first_thread = ingest(&mut conn, &mut first).await;

        // No headers at all, but same subject, shared participant, in range.
        let mut second = message("b", "client@example.com", "Re: Mini sessions", 4);
        let second_thread = ingest(&mut conn, &mut second).await;

        assert_eq!(second_thread, first_thread);
    }

    #[tokio::test]
    async fn heuristic_respects_the_window() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut first = message("a", "client@example.com", "Mini sessions", 1);
        let first_thread = ingest(&mut conn, &mut first).await;

        let mut late = message("b", "client@example.com", "Mini sessions", 25);
        let late_thread = ingest(&mut conn, &mut late).await;

        assert_ne!(late_thread, first_thread);
    }

    #[tokio::test]
    async fn heuristic_needs_a_shared_participant() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut first = message("a", "alice@example.com", "Invoice", 1);
        let first_thread = ingest(&mut conn, &mut first).await;

        let mut unrelated = message("b", "bob@other.example", "Invoice", 2);
        unrelated.to_emails = vec!["zoe@other.example".to_string()];
        let other_thread = ingest(&mut conn, &mut unrelated).await;

        assert_ne!(other_thread, first_thread);
    }

    #[tokio::test]
    async fn blank_subjects_never_group() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut first = message("a", "client@example.com", "", 1);
        let first_thread = ingest(&mut conn, &mut first).await;
        let mut second = message("b", "client@example.com", "", 2);
        let second_thread = ingest(&mut conn, &mut second).await;

        assert_ne!(first_thread, second_thread);
    }

    #[tokio::test]
    async fn late_correlation_merges_smaller_onto_larger() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut a1 = message("a1", "client@example.com", "Retouching", 1);
        let thread_a = ingest(&mut conn, &mut a1).await;
        let mut a2 = message("a2", "studio@example.com", "Re: Retouching", 2);
        a2.in_reply_to = Some("<a1@example.com>".to_string());
        ingest(&mut conn, &mut a2).await;

        let mut b1 = message("b1", "printer@example.com", "Print order", 3);
        ingest(&mut conn, &mut b1).await;

        // One message referencing both sides pulls everything into the
        // larger thread.
        let mut bridge = message("c", "studio@example.com", "Re: Print order", 4);
        bridge.references = vec!["<a2@example.com>".to_string(), "<b1@example.com>".to_string()];
        let settled = ingest(&mut conn, &mut bridge).await;
        // Release the single pooled connection so `thread_size` can acquire it.
        drop(conn);

        assert_eq!(settled, thread_a);
        assert_eq!(thread_size(&store, &thread_a).await, 4);
    }

    #[tokio::test]
    async fn merging_again_changes_nothing() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let mut parent = message("p", "client@example.com", "Booking", 1);
        let thread = ingest(&mut conn, &mut parent).await;
        let mut reply = message("r", "studio@example.com", "Re: Booking", 2);
        reply.in_reply_to = Some("<p@example.com>".to_string());
        ingest(&mut conn, &mut reply).await;

        let again = link_message(&mut conn, &mut reply, window()).await.unwrap();
        // Release the single pooled connection so `thread_size` can acquire it.
        drop(conn);
        assert_eq!(again, thread);
        assert_eq!(thread_size(&store, &thread).await, 2);
    }
}
