use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::{Notification, ObjectRef, User, Verb};

use crate::error::OptionalExt;
use crate::models::{NotificationRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

/// Upper bound on the "latest notifications" dropdown.
pub const MOST_RECENT_LIMIT: usize = 5;

const SLUG_MAX_LEN: usize = 200;

const FROM_NOTIFICATIONS: &str = "FROM notifications n
     JOIN users a ON n.actor_id = a.id
     JOIN users r ON n.recipient_id = r.id";

impl Database {
    pub fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.with_conn(|conn| {
            query_notification(conn, "n.id = ?1", &id.to_string())?
                .ok_or_else(|| StoreError::not_found("notification", id))
        })
    }

    pub fn get_notification_by_slug(&self, slug: &str) -> Result<Notification> {
        self.with_conn(|conn| {
            query_notification(conn, "n.slug = ?1", slug)?
                .ok_or_else(|| StoreError::not_found("notification", slug))
        })
    }

    pub fn unread_notifications(&self, recipient: &str) -> Result<Vec<Notification>> {
        self.with_conn(|conn| query_unread(conn, recipient, None))
    }

    /// Newest unread notifications for `recipient`, never more than five.
    pub fn most_recent_notifications(&self, recipient: &str, limit: usize) -> Result<Vec<Notification>> {
        let limit = limit.min(MOST_RECENT_LIMIT);
        self.with_conn(|conn| query_unread(conn, recipient, Some(limit)))
    }

    pub fn mark_all_notifications_read(&self, recipient: Option<&str>) -> Result<usize> {
        self.with_conn(|conn| update_all_unread_flag(conn, recipient, false))
    }

    pub fn mark_all_notifications_unread(&self, recipient: Option<&str>) -> Result<usize> {
        self.with_conn(|conn| update_all_unread_flag(conn, recipient, true))
    }

    pub fn mark_notification_read(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| update_unread_flag(conn, id, false))
    }

    pub fn mark_notification_unread(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| update_unread_flag(conn, id, true))
    }
}

/// Lowercase, collapse every run of non-alphanumerics into `-`, trim the
/// ends, and cap the length.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

pub fn insert_notification(
    conn: &Connection,
    actor: &User,
    recipient: &User,
    verb: Verb,
    action_object: Option<ObjectRef>,
) -> Result<Notification> {
    let id = Uuid::new_v4();
    let created_at = timestamp();
    let verb_code = verb.code().to_string();
    let slug = slugify(
        &format!("{} {} {}", recipient.username, id, verb_code),
        SLUG_MAX_LEN,
    );

    conn.execute(
        "INSERT INTO notifications
             (id, actor_id, recipient_id, verb, object_kind, object_id, slug, unread, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
        rusqlite::params![
            id.to_string(),
            actor.id.to_string(),
            recipient.id.to_string(),
            verb_code,
            action_object.map(|o| o.kind()),
            action_object.map(|o| o.id().to_string()),
            slug,
            created_at,
        ],
    )?;

    NotificationRow {
        id: id.to_string(),
        actor: actor.username.clone(),
        recipient: recipient.username.clone(),
        verb: verb_code,
        object_kind: action_object.map(|o| o.kind().to_string()),
        object_id: action_object.map(|o| o.id().to_string()),
        slug,
        unread: true,
        created_at,
    }
    .into_model()
}

fn query_notification(conn: &Connection, predicate: &str, value: &str) -> Result<Option<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE {}",
        NotificationRow::COLUMNS,
        FROM_NOTIFICATIONS,
        predicate
    ))?;

    stmt.query_row([value], NotificationRow::from_row)
        .optional()?
        .map(NotificationRow::into_model)
        .transpose()
}

pub fn query_unread(conn: &Connection, recipient: &str, limit: Option<usize>) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {}
         WHERE r.username = ?1 AND n.unread = 1
         ORDER BY n.created_at DESC, n.rowid DESC
         LIMIT ?2",
        NotificationRow::COLUMNS,
        FROM_NOTIFICATIONS
    ))?;

    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, |l| l as i64);
    let rows = stmt.query_map(rusqlite::params![recipient, limit], NotificationRow::from_row)?;
    collect_models(rows, NotificationRow::into_model)
}

/// Set `unread` on every row currently in the opposite state, optionally
/// restricted to one recipient. Returns how many rows changed.
pub fn update_all_unread_flag(conn: &Connection, recipient: Option<&str>, unread: bool) -> Result<usize> {
    let changed = match recipient {
        Some(username) => conn.execute(
            "UPDATE notifications SET unread = ?1
             WHERE unread = ?2
               AND recipient_id = (SELECT id FROM users WHERE username = ?3)",
            rusqlite::params![unread, !unread, username],
        )?,
        None => conn.execute(
            "UPDATE notifications SET unread = ?1 WHERE unread = ?2",
            rusqlite::params![unread, !unread],
        )?,
    };
    Ok(changed)
}

/// Returns whether the row changed. Setting a flag it already has is a no-op.
pub fn update_unread_flag(conn: &Connection, id: Uuid, unread: bool) -> Result<bool> {
    let id = id.to_string();
    let current: Option<bool> = conn
        .query_row("SELECT unread FROM notifications WHERE id = ?1", [&id], |r| r.get(0))
        .optional()?;

    match current {
        None => Err(StoreError::not_found("notification", id)),
        Some(flag) if flag == unread => Ok(false),
        Some(_) => {
            conn.execute(
                "UPDATE notifications SET unread = ?1 WHERE id = ?2",
                rusqlite::params![unread, id],
            )?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, User, User) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        (db, alice, bob)
    }

    fn notify(db: &Database, actor: &User, recipient: &User, verb: Verb) -> Notification {
        db.with_conn(|conn| insert_notification(conn, actor, recipient, verb, None))
            .unwrap()
    }

    #[test]
    fn slugify_matches_expected_shape() {
        assert_eq!(slugify("Bob  1234-ABCD R", 200), "bob-1234-abcd-r");
        assert_eq!(slugify("--hello, world!--", 200), "hello-world");
        assert_eq!(slugify("abc def", 4), "abc");
        assert_eq!(slugify("", 10), "");
    }

    #[test]
    fn slug_is_computed_once_from_recipient_id_and_verb() {
        let (db, alice, bob) = setup();
        let n = notify(&db, &alice, &bob, Verb::Replied);
        assert_eq!(n.slug, format!("bob-{}-r", n.id));

        let fetched = db.get_notification_by_slug(&n.slug).unwrap();
        assert_eq!(fetched, n);
    }

    #[test]
    fn action_object_roundtrips() {
        let (db, alice, bob) = setup();
        let object = ObjectRef::News(Uuid::new_v4());
        let n = db
            .with_conn(|conn| insert_notification(conn, &alice, &bob, Verb::Liked, Some(object)))
            .unwrap();
        assert_eq!(db.get_notification(n.id).unwrap().action_object, Some(object));
    }

    #[test]
    fn most_recent_is_unread_newest_first_and_capped() {
        let (db, alice, bob) = setup();
        let mut ids = Vec::new();
        for _ in 0..7 {
            ids.push(notify(&db, &alice, &bob, Verb::Liked).id);
        }
        db.mark_notification_read(ids[6]).unwrap();

        let latest = db.most_recent_notifications("bob", 10).unwrap();
        let got: Vec<Uuid> = latest.iter().map(|n| n.id).collect();
        assert_eq!(got, vec![ids[5], ids[4], ids[3], ids[2], ids[1]]);

        assert_eq!(db.most_recent_notifications("bob", 2).unwrap().len(), 2);
        assert!(db.most_recent_notifications("alice", 5).unwrap().is_empty());
    }

    #[test]
    fn mark_all_read_counts_changes_and_respects_filter() {
        let (db, alice, bob) = setup();
        notify(&db, &alice, &bob, Verb::Liked);
        notify(&db, &alice, &bob, Verb::Shared);
        notify(&db, &bob, &alice, Verb::Replied);

        assert_eq!(db.mark_all_notifications_read(Some("bob")).unwrap(), 2);
        assert_eq!(db.mark_all_notifications_read(Some("bob")).unwrap(), 0);
        assert_eq!(db.unread_notifications("alice").unwrap().len(), 1);

        assert_eq!(db.mark_all_notifications_read(None).unwrap(), 1);
        assert_eq!(db.mark_all_notifications_unread(None).unwrap(), 3);
    }

    #[test]
    fn single_toggle_is_idempotent() {
        let (db, alice, bob) = setup();
        let n = notify(&db, &alice, &bob, Verb::Voted);

        assert!(db.mark_notification_read(n.id).unwrap());
        assert!(!db.mark_notification_read(n.id).unwrap());
        assert!(!db.get_notification(n.id).unwrap().unread);

        assert!(db.mark_notification_unread(n.id).unwrap());
        assert!(db.get_notification(n.id).unwrap().unread);
    }

    #[test]
    fn unknown_notification_is_not_found() {
        let (db, ..) = setup();
        assert!(db.mark_notification_read(Uuid::new_v4()).unwrap_err().is_not_found());
        assert!(db.get_notification_by_slug("nope").unwrap_err().is_not_found());
    }
}
