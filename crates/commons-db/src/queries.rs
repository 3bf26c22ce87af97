//! User directory queries. Accounts are owned by the external auth service;
//! only identity and the active flag matter here.

use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::User;

use crate::error::OptionalExt;
use crate::models::{UserRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

impl Database {
    pub fn create_user(&self, username: &str) -> Result<User> {
        self.with_conn(|conn| insert_user(conn, username))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        Ok(self.get_user_by_username(username)?.is_some())
    }

    pub fn set_user_active(&self, username: &str, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?1 WHERE username = ?2",
                rusqlite::params![active, username],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("user", username));
            }
            Ok(())
        })
    }

    /// Active users other than `excluding`, ordered by username.
    pub fn active_users(&self, excluding: &str) -> Result<Vec<User>> {
        self.with_conn(|conn| query_active_users(conn, excluding))
    }
}

pub fn insert_user(conn: &Connection, username: &str) -> Result<User> {
    let id = Uuid::new_v4();
    let created_at = timestamp();
    conn.execute(
        "INSERT INTO users (id, username, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
        (id.to_string(), username, &created_at),
    )?;

    UserRow {
        id: id.to_string(),
        username: username.to_string(),
        is_active: true,
        created_at,
    }
    .into_model()
}

pub fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE username = ?1",
        UserRow::COLUMNS
    ))?;

    stmt.query_row([username], UserRow::from_row)
        .optional()?
        .map(UserRow::into_model)
        .transpose()
}

/// Like [`query_user_by_username`] but missing users are an error.
pub fn require_user(conn: &Connection, username: &str) -> Result<User> {
    query_user_by_username(conn, username)?.ok_or_else(|| StoreError::not_found("user", username))
}

pub fn query_active_users(conn: &Connection, excluding: &str) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE is_active = 1 AND username != ?1 ORDER BY username",
        UserRow::COLUMNS
    ))?;

    let rows = stmt.query_map([excluding], UserRow::from_row)?;
    collect_models(rows, UserRow::into_model)
}
