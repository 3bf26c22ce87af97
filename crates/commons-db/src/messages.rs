use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::{Message, User};

use crate::error::OptionalExt;
use crate::models::{MessageRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

const FROM_MESSAGES: &str = "FROM messages m
     LEFT JOIN users s ON m.sender_id = s.id
     LEFT JOIN users r ON m.recipient_id = r.id";

impl Database {
    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.with_conn(|conn| {
            query_message(conn, id)?.ok_or_else(|| StoreError::not_found("message", id))
        })
    }

    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_conversation(conn, a, b))
    }

    pub fn most_recent_counterpart(&self, username: &str) -> Result<String> {
        self.with_conn(|conn| query_most_recent_counterpart(conn, username))
    }

    pub fn mark_conversation_read(&self, sender: &str, recipient: &str) -> Result<usize> {
        self.with_conn(|conn| update_conversation_read(conn, sender, recipient))
    }

    pub fn mark_message_read(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| update_message_read(conn, id))
    }
}

pub fn insert_message(conn: &Connection, sender: &User, recipient: &User, body: &str) -> Result<Message> {
    let id = Uuid::new_v4();
    let created_at = timestamp();

    conn.execute(
        "INSERT INTO messages (id, sender_id, recipient_id, body, created_at, unread)
         VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        rusqlite::params![
            id.to_string(),
            sender.id.to_string(),
            recipient.id.to_string(),
            body,
            created_at
        ],
    )?;

    MessageRow {
        id: id.to_string(),
        sender: Some(sender.username.clone()),
        recipient: Some(recipient.username.clone()),
        body: body.to_string(),
        created_at,
        unread: true,
    }
    .into_model()
}

pub fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE m.id = ?1",
        MessageRow::COLUMNS,
        FROM_MESSAGES
    ))?;

    stmt.query_row([id.to_string()], MessageRow::from_row)
        .optional()?
        .map(MessageRow::into_model)
        .transpose()
}

/// Both directions between `a` and `b`, oldest first.
///
/// One predicate over the table, so a row can appear at most once no matter
/// which direction matched it.
pub fn query_conversation(conn: &Connection, a: &str, b: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {}
         WHERE (s.username = ?1 AND r.username = ?2)
            OR (s.username = ?2 AND r.username = ?1)
         ORDER BY m.created_at ASC, m.rowid ASC",
        MessageRow::COLUMNS,
        FROM_MESSAGES
    ))?;

    let rows = stmt.query_map([a, b], MessageRow::from_row)?;
    collect_models(rows, MessageRow::into_model)
}

/// The other party of `username`'s latest message, sent or received.
///
/// With no messages at all, or when the other account is gone, this falls
/// back to `username` itself. That is a placeholder, not a real counterpart;
/// callers render it as an empty thread.
pub fn query_most_recent_counterpart(conn: &Connection, username: &str) -> Result<String> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {}
         WHERE s.username = ?1 OR r.username = ?1
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT 1",
        MessageRow::COLUMNS,
        FROM_MESSAGES
    ))?;

    let latest = stmt.query_row([username], MessageRow::from_row).optional()?;

    let counterpart = latest.and_then(|row| {
        if row.sender.as_deref() == Some(username) {
            row.recipient
        } else {
            row.sender
        }
    });

    Ok(counterpart.unwrap_or_else(|| username.to_string()))
}

/// Flip unread messages sent by `sender` to `recipient`. The reverse
/// direction is untouched. Returns how many rows changed.
pub fn update_conversation_read(conn: &Connection, sender: &str, recipient: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE messages SET unread = 0
         WHERE unread = 1
           AND sender_id = (SELECT id FROM users WHERE username = ?1)
           AND recipient_id = (SELECT id FROM users WHERE username = ?2)",
        [sender, recipient],
    )?;
    Ok(changed)
}

/// Returns whether the row changed; already-read messages are a no-op.
pub fn update_message_read(conn: &Connection, id: Uuid) -> Result<bool> {
    let id = id.to_string();
    let exists: Option<bool> = conn
        .query_row("SELECT unread FROM messages WHERE id = ?1", [&id], |r| r.get(0))
        .optional()?;

    match exists {
        None => Err(StoreError::not_found("message", id)),
        Some(false) => Ok(false),
        Some(true) => {
            conn.execute("UPDATE messages SET unread = 0 WHERE id = ?1", [&id])?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn setup() -> (Database, User, User, User) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let carol = db.create_user("carol").unwrap();
        (db, alice, bob, carol)
    }

    fn send(db: &Database, from: &User, to: &User, body: &str) -> Message {
        db.with_conn(|conn| insert_message(conn, from, to, body)).unwrap()
    }

    #[test]
    fn conversation_is_symmetric_and_ordered() {
        let (db, alice, bob, carol) = setup();
        let m1 = send(&db, &alice, &bob, "hi bob");
        let m2 = send(&db, &bob, &alice, "hi alice");
        send(&db, &carol, &alice, "unrelated");
        let m3 = send(&db, &alice, &bob, "how are you");

        let ab = db.get_conversation("alice", "bob").unwrap();
        let ba = db.get_conversation("bob", "alice").unwrap();

        let ids: Vec<Uuid> = ab.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m1.id, m2.id, m3.id]);
        assert_eq!(ab, ba);

        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ab.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn single_message_scenario() {
        let (db, alice, bob, _) = setup();
        let sent = send(&db, &alice, &bob, "hello");

        let convo = db.get_conversation("alice", "bob").unwrap();
        assert_eq!(convo.len(), 1);
        let m = &convo[0];
        assert_eq!(m.id, sent.id);
        assert_eq!(m.sender.as_deref(), Some("alice"));
        assert_eq!(m.recipient.as_deref(), Some("bob"));
        assert_eq!(m.body, "hello");
        assert!(m.unread);
    }

    #[test]
    fn most_recent_counterpart_tracks_either_direction() {
        let (db, alice, bob, carol) = setup();
        assert_eq!(db.most_recent_counterpart("alice").unwrap(), "alice");

        send(&db, &alice, &bob, "one");
        assert_eq!(db.most_recent_counterpart("alice").unwrap(), "bob");
        assert_eq!(db.most_recent_counterpart("bob").unwrap(), "alice");

        send(&db, &carol, &alice, "two");
        assert_eq!(db.most_recent_counterpart("alice").unwrap(), "carol");
        assert_eq!(db.most_recent_counterpart("bob").unwrap(), "alice");
    }

    #[test]
    fn mark_conversation_read_is_directional() {
        let (db, alice, bob, _) = setup();
        send(&db, &alice, &bob, "a1");
        send(&db, &alice, &bob, "a2");
        send(&db, &bob, &alice, "b1");

        assert_eq!(db.mark_conversation_read("alice", "bob").unwrap(), 2);
        assert_eq!(db.mark_conversation_read("alice", "bob").unwrap(), 0);

        let convo = db.get_conversation("alice", "bob").unwrap();
        let unread: Vec<&str> = convo.iter().filter(|m| m.unread).map(|m| m.body.as_str()).collect();
        assert_eq!(unread, vec!["b1"]);
    }

    #[test]
    fn mark_message_read_is_idempotent() {
        let (db, alice, bob, _) = setup();
        let m = send(&db, &alice, &bob, "hello");

        assert!(db.mark_message_read(m.id).unwrap());
        assert!(!db.mark_message_read(m.id).unwrap());
        assert!(!db.get_message(m.id).unwrap().unread);
    }

    #[test]
    fn unknown_message_is_not_found() {
        let (db, ..) = setup();
        let missing = Uuid::new_v4();
        assert!(db.get_message(missing).unwrap_err().is_not_found());
        assert!(db.mark_message_read(missing).unwrap_err().is_not_found());
    }

    #[test]
    fn oversized_body_is_rejected_by_schema() {
        let (db, alice, bob, _) = setup();
        let body = "x".repeat(1001);
        let err = db.with_conn(|conn| insert_message(conn, &alice, &bob, &body)).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }
}
