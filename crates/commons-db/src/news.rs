use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::{News, User};

use crate::error::OptionalExt;
use crate::models::{NewsRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

const FROM_NEWS: &str = "FROM news n LEFT JOIN users u ON n.user_id = u.id";

impl Database {
    pub fn get_news(&self, id: Uuid) -> Result<News> {
        self.with_conn(|conn| require_news(conn, id))
    }

    /// Top-level posts, newest first.
    pub fn get_feed(&self, limit: u32) -> Result<Vec<News>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} {} WHERE n.reply = 0 ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?1",
                NewsRow::COLUMNS,
                FROM_NEWS
            ))?;
            let rows = stmt.query_map([limit], NewsRow::from_row)?;
            collect_models(rows, NewsRow::into_model)
        })
    }

    pub fn get_thread(&self, id: Uuid) -> Result<Vec<News>> {
        self.with_conn(|conn| {
            let root = thread_root(conn, id)?;
            query_thread(conn, root.id)
        })
    }

    pub fn count_likes(&self, id: Uuid) -> Result<usize> {
        self.with_conn(|conn| query_count_likes(conn, id))
    }

    pub fn count_comments(&self, id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let root = thread_root(conn, id)?;
            query_count_thread(conn, root.id)
        })
    }
}

pub fn insert_news(conn: &Connection, author: &User, content: &str, parent: Option<Uuid>) -> Result<News> {
    let id = Uuid::new_v4();
    let created_at = timestamp();
    let parent_id = parent.map(|p| p.to_string());

    conn.execute(
        "INSERT INTO news (id, user_id, parent_id, content, reply, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            author.id.to_string(),
            parent_id,
            content,
            parent.is_some(),
            created_at
        ],
    )?;

    NewsRow {
        id: id.to_string(),
        author: Some(author.username.clone()),
        parent_id,
        content: content.to_string(),
        reply: parent.is_some(),
        created_at,
    }
    .into_model()
}

pub fn require_news(conn: &Connection, id: Uuid) -> Result<News> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE n.id = ?1",
        NewsRow::COLUMNS,
        FROM_NEWS
    ))?;

    stmt.query_row([id.to_string()], NewsRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("news", id))?
        .into_model()
}

/// The post a thread hangs off: the news itself, or its parent if it is a reply.
pub fn thread_root(conn: &Connection, id: Uuid) -> Result<News> {
    let news = require_news(conn, id)?;
    match news.parent_id {
        Some(parent) => require_news(conn, parent),
        None => Ok(news),
    }
}

/// Replies under `root_id`, newest first.
pub fn query_thread(conn: &Connection, root_id: Uuid) -> Result<Vec<News>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE n.parent_id = ?1 ORDER BY n.created_at DESC, n.rowid DESC",
        NewsRow::COLUMNS,
        FROM_NEWS
    ))?;
    let rows = stmt.query_map([root_id.to_string()], NewsRow::from_row)?;
    collect_models(rows, NewsRow::into_model)
}

pub fn query_count_thread(conn: &Connection, root_id: Uuid) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM news WHERE parent_id = ?1",
        [root_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

pub fn query_count_likes(conn: &Connection, id: Uuid) -> Result<usize> {
    require_news(conn, id)?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM news_likes WHERE news_id = ?1",
        [id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

/// Toggle a like: removes if exists, inserts if not.
/// Returns true if the user now likes the post.
pub fn toggle_like(conn: &Connection, news_id: Uuid, user: &User) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM news_likes WHERE news_id = ?1 AND user_id = ?2",
        [news_id.to_string(), user.id.to_string()],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO news_likes (news_id, user_id) VALUES (?1, ?2)",
        [news_id.to_string(), user.id.to_string()],
    )?;
    Ok(true)
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

    #[test]
    fn replies_attach_to_thread_root() {
        let (db, alice, bob) = setup();
        let root = db.with_conn(|c| insert_news(c, &alice, "root", None)).unwrap();
        let r1 = db.with_conn(|c| insert_news(c, &bob, "r1", Some(root.id))).unwrap();

        let thread_from_reply = db.get_thread(r1.id).unwrap();
        let thread_from_root = db.get_thread(root.id).unwrap();
        assert_eq!(thread_from_reply, thread_from_root);
        assert_eq!(db.count_comments(r1.id).unwrap(), 1);

        let feed: Vec<Uuid> = db.get_feed(10).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(feed, vec![root.id]);
    }

    #[test]
    fn like_toggles() {
        let (db, alice, bob) = setup();
        let post = db.with_conn(|c| insert_news(c, &alice, "post", None)).unwrap();

        assert!(db.with_conn(|c| toggle_like(c, post.id, &bob)).unwrap());
        assert_eq!(db.count_likes(post.id).unwrap(), 1);
        assert!(!db.with_conn(|c| toggle_like(c, post.id, &bob)).unwrap());
        assert_eq!(db.count_likes(post.id).unwrap(), 0);
    }

    #[test]
    fn content_over_280_is_rejected() {
        let (db, alice, _) = setup();
        let long = "y".repeat(281);
        let err = db.with_conn(|c| insert_news(c, &alice, &long, None)).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }
}
