//! Database row types. These map directly to SQLite rows and are converted
//! into the commons-types models at the edge of each query.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use commons_types::models::{
    Answer, Message, News, Notification, ObjectRef, Question, Target, User, Verb, Vote,
};

use crate::{Result, StoreError};

/// Current time in the fixed-width form every `created_at` column uses.
/// Lexical order of these strings is chronological order.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("id '{}': {}", raw, e)))
}

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: String,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str = "id, username, is_active, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            is_active: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            is_active: self.is_active,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub body: String,
    pub created_at: String,
    pub unread: bool,
}

impl MessageRow {
    /// Expects `m` = messages, `s` = sender users, `r` = recipient users.
    pub(crate) const COLUMNS: &'static str =
        "m.id, s.username, r.username, m.body, m.created_at, m.unread";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            recipient: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            unread: row.get(5)?,
        })
    }

    pub fn into_model(self) -> Result<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            sender: self.sender,
            recipient: self.recipient,
            body: self.body,
            created_at: parse_time(&self.created_at)?,
            unread: self.unread,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub actor: String,
    pub recipient: String,
    pub verb: String,
    pub object_kind: Option<String>,
    pub object_id: Option<String>,
    pub slug: String,
    pub unread: bool,
    pub created_at: String,
}

impl NotificationRow {
    /// Expects `n` = notifications, `a` = actor users, `r` = recipient users.
    pub(crate) const COLUMNS: &'static str = "n.id, a.username, r.username, n.verb, \
         n.object_kind, n.object_id, n.slug, n.unread, n.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            actor: row.get(1)?,
            recipient: row.get(2)?,
            verb: row.get(3)?,
            object_kind: row.get(4)?,
            object_id: row.get(5)?,
            slug: row.get(6)?,
            unread: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn into_model(self) -> Result<Notification> {
        let verb = self
            .verb
            .chars()
            .next()
            .and_then(Verb::from_code)
            .ok_or_else(|| StoreError::Corrupt(format!("verb '{}' on {}", self.verb, self.id)))?;

        let action_object = match (self.object_kind, self.object_id) {
            (Some(kind), Some(id)) => Some(
                ObjectRef::from_parts(&kind, parse_id(&id)?)
                    .ok_or_else(|| StoreError::Corrupt(format!("object kind '{}'", kind)))?,
            ),
            _ => None,
        };

        Ok(Notification {
            id: parse_id(&self.id)?,
            actor: self.actor,
            recipient: self.recipient,
            verb,
            action_object,
            slug: self.slug,
            unread: self.unread,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

pub struct VoteRow {
    pub id: String,
    pub user: String,
    pub target_kind: String,
    pub target_id: String,
    pub value: bool,
    pub created_at: String,
}

impl VoteRow {
    /// Expects `v` = votes, `u` = users.
    pub(crate) const COLUMNS: &'static str =
        "v.id, u.username, v.target_kind, v.target_id, v.value, v.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user: row.get(1)?,
            target_kind: row.get(2)?,
            target_id: row.get(3)?,
            value: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn into_model(self) -> Result<Vote> {
        let target = Target::from_parts(&self.target_kind, parse_id(&self.target_id)?)
            .ok_or_else(|| StoreError::Corrupt(format!("target kind '{}'", self.target_kind)))?;

        Ok(Vote {
            id: parse_id(&self.id)?,
            user: self.user,
            target,
            value: self.value,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

pub struct QuestionRow {
    pub id: String,
    pub author: String,
    pub title: String,
    pub content: String,
    pub has_answer: bool,
    pub total_votes: i64,
    pub created_at: String,
}

impl QuestionRow {
    /// Expects `q` = questions, `u` = users.
    pub(crate) const COLUMNS: &'static str =
        "q.id, u.username, q.title, q.content, q.has_answer, q.total_votes, q.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            has_answer: row.get(4)?,
            total_votes: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_model(self) -> Result<Question> {
        Ok(Question {
            id: parse_id(&self.id)?,
            author: self.author,
            title: self.title,
            content: self.content,
            has_answer: self.has_answer,
            total_votes: self.total_votes,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

pub struct AnswerRow {
    pub id: String,
    pub question_id: String,
    pub author: String,
    pub content: String,
    pub is_answer: bool,
    pub total_votes: i64,
    pub created_at: String,
}

impl AnswerRow {
    /// Expects `a` = answers, `u` = users.
    pub(crate) const COLUMNS: &'static str =
        "a.id, a.question_id, u.username, a.content, a.is_answer, a.total_votes, a.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            question_id: row.get(1)?,
            author: row.get(2)?,
            content: row.get(3)?,
            is_answer: row.get(4)?,
            total_votes: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_model(self) -> Result<Answer> {
        Ok(Answer {
            id: parse_id(&self.id)?,
            question_id: parse_id(&self.question_id)?,
            author: self.author,
            content: self.content,
            is_answer: self.is_answer,
            total_votes: self.total_votes,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

pub struct NewsRow {
    pub id: String,
    pub author: Option<String>,
    pub parent_id: Option<String>,
    pub content: String,
    pub reply: bool,
    pub created_at: String,
}

impl NewsRow {
    /// Expects `n` = news, `u` = users.
    pub(crate) const COLUMNS: &'static str =
        "n.id, u.username, n.parent_id, n.content, n.reply, n.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author: row.get(1)?,
            parent_id: row.get(2)?,
            content: row.get(3)?,
            reply: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn into_model(self) -> Result<News> {
        Ok(News {
            id: parse_id(&self.id)?,
            author: self.author,
            parent_id: self.parent_id.as_deref().map(parse_id).transpose()?,
            content: self.content,
            reply: self.reply,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub(crate) fn collect_models<R, M>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
    convert: impl Fn(R) -> Result<M>,
) -> Result<Vec<M>> {
    rows.map(|row| convert(row?)).collect()
}
