//! Vote tally storage.
//!
//! The vote set is the source of truth. `total_votes` on questions and
//! answers is a cache that is only ever rewritten from one aggregate query
//! over that set, never adjusted by a delta.

use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::{Target, User, Vote};

use crate::models::{VoteRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

fn votable_table(target: Target) -> &'static str {
    match target {
        Target::Question(_) => "questions",
        Target::Answer(_) => "answers",
    }
}

impl Database {
    pub fn get_votes(&self, target: Target) -> Result<Vec<Vote>> {
        self.with_conn(|conn| query_votes(conn, target))
    }

    pub fn upvoters(&self, target: Target) -> Result<Vec<String>> {
        self.with_conn(|conn| query_voters(conn, target, true))
    }

    pub fn downvoters(&self, target: Target) -> Result<Vec<String>> {
        self.with_conn(|conn| query_voters(conn, target, false))
    }

    pub fn total_votes(&self, target: Target) -> Result<i64> {
        self.with_conn(|conn| query_total_votes(conn, target))
    }
}

/// Insert the vote, or overwrite the value of the existing one for the
/// same (user, target). The unique index makes a second row impossible.
pub fn upsert_vote(conn: &Connection, user: &User, target: Target, value: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO votes (id, user_id, target_kind, target_id, value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, target_kind, target_id) DO UPDATE SET value = excluded.value",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            user.id.to_string(),
            target.kind(),
            target.id().to_string(),
            value,
            timestamp(),
        ],
    )?;
    Ok(())
}

/// Rewrite the cached total from the vote set in a single statement and
/// return it.
pub fn recount_votes(conn: &Connection, target: Target) -> Result<i64> {
    let table = votable_table(target);
    let changed = conn.execute(
        &format!(
            "UPDATE {table} SET total_votes = (
                 SELECT COALESCE(SUM(CASE WHEN value THEN 1 ELSE -1 END), 0)
                 FROM votes WHERE target_kind = ?1 AND target_id = ?2
             )
             WHERE id = ?2"
        ),
        [target.kind().to_string(), target.id().to_string()],
    )?;

    if changed == 0 {
        return Err(StoreError::not_found(target.kind(), target.id()));
    }
    query_total_votes(conn, target)
}

pub fn query_total_votes(conn: &Connection, target: Target) -> Result<i64> {
    use crate::error::OptionalExt;

    conn.query_row(
        &format!("SELECT total_votes FROM {} WHERE id = ?1", votable_table(target)),
        [target.id().to_string()],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(target.kind(), target.id()))
}

pub fn query_votes(conn: &Connection, target: Target) -> Result<Vec<Vote>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM votes v JOIN users u ON v.user_id = u.id
         WHERE v.target_kind = ?1 AND v.target_id = ?2
         ORDER BY v.created_at, v.rowid",
        VoteRow::COLUMNS
    ))?;

    let rows = stmt.query_map(
        [target.kind().to_string(), target.id().to_string()],
        VoteRow::from_row,
    )?;
    collect_models(rows, VoteRow::into_model)
}

fn query_voters(conn: &Connection, target: Target, value: bool) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT u.username FROM votes v JOIN users u ON v.user_id = u.id
         WHERE v.target_kind = ?1 AND v.target_id = ?2 AND v.value = ?3
         ORDER BY u.username",
    )?;

    let names = stmt
        .query_map(
            rusqlite::params![target.kind(), target.id().to_string(), value],
            |r| r.get(0),
        )?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}
