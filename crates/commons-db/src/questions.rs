use rusqlite::Connection;
use uuid::Uuid;

use commons_types::models::{Answer, Question, User};

use crate::error::OptionalExt;
use crate::models::{AnswerRow, QuestionRow, collect_models, timestamp};
use crate::{Database, Result, StoreError};

const FROM_QUESTIONS: &str = "FROM questions q JOIN users u ON q.user_id = u.id";
const FROM_ANSWERS: &str = "FROM answers a JOIN users u ON a.user_id = u.id";

impl Database {
    pub fn create_question(&self, author: &str, title: &str, content: &str) -> Result<Question> {
        self.with_conn(|conn| {
            let author = crate::queries::require_user(conn, author)?;
            insert_question(conn, &author, title, content)
        })
    }

    pub fn create_answer(&self, question_id: Uuid, author: &str, content: &str) -> Result<Answer> {
        self.with_conn(|conn| {
            let author = crate::queries::require_user(conn, author)?;
            require_question(conn, question_id)?;
            insert_answer(conn, question_id, &author, content)
        })
    }

    pub fn get_question(&self, id: Uuid) -> Result<Question> {
        self.with_conn(|conn| require_question(conn, id))
    }

    pub fn get_answer(&self, id: Uuid) -> Result<Answer> {
        self.with_conn(|conn| require_answer(conn, id))
    }

    /// Accepted answer first, then newest first.
    pub fn get_answers(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        self.with_conn(|conn| query_answers(conn, question_id))
    }

    pub fn get_accepted_answer(&self, question_id: Uuid) -> Result<Option<Answer>> {
        self.with_conn(|conn| {
            Ok(query_answers(conn, question_id)?
                .into_iter()
                .find(|a| a.is_answer))
        })
    }
}

pub fn insert_question(conn: &Connection, author: &User, title: &str, content: &str) -> Result<Question> {
    let id = Uuid::new_v4();
    let created_at = timestamp();
    conn.execute(
        "INSERT INTO questions (id, user_id, title, content, has_answer, total_votes, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
        (id.to_string(), author.id.to_string(), title, content, &created_at),
    )?;

    QuestionRow {
        id: id.to_string(),
        author: author.username.clone(),
        title: title.to_string(),
        content: content.to_string(),
        has_answer: false,
        total_votes: 0,
        created_at,
    }
    .into_model()
}

pub fn insert_answer(conn: &Connection, question_id: Uuid, author: &User, content: &str) -> Result<Answer> {
    let id = Uuid::new_v4();
    let created_at = timestamp();
    conn.execute(
        "INSERT INTO answers (id, question_id, user_id, content, is_answer, total_votes, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
        (id.to_string(), question_id.to_string(), author.id.to_string(), content, &created_at),
    )?;

    AnswerRow {
        id: id.to_string(),
        question_id: question_id.to_string(),
        author: author.username.clone(),
        content: content.to_string(),
        is_answer: false,
        total_votes: 0,
        created_at,
    }
    .into_model()
}

pub fn require_question(conn: &Connection, id: Uuid) -> Result<Question> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE q.id = ?1",
        QuestionRow::COLUMNS,
        FROM_QUESTIONS
    ))?;

    stmt.query_row([id.to_string()], QuestionRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("question", id))?
        .into_model()
}

pub fn require_answer(conn: &Connection, id: Uuid) -> Result<Answer> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE a.id = ?1",
        AnswerRow::COLUMNS,
        FROM_ANSWERS
    ))?;

    stmt.query_row([id.to_string()], AnswerRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("answer", id))?
        .into_model()
}

pub fn query_answers(conn: &Connection, question_id: Uuid) -> Result<Vec<Answer>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE a.question_id = ?1
         ORDER BY a.is_answer DESC, a.created_at DESC, a.rowid DESC",
        AnswerRow::COLUMNS,
        FROM_ANSWERS
    ))?;

    let rows = stmt.query_map([question_id.to_string()], AnswerRow::from_row)?;
    collect_models(rows, AnswerRow::into_model)
}

/// Make `answer_id` the only accepted answer of its question and flag the
/// question as answered. Must run inside a transaction so the three writes
/// land together.
pub fn update_accept_answer(conn: &Connection, answer_id: Uuid) -> Result<Answer> {
    let answer = require_answer(conn, answer_id)?;
    let question_id = answer.question_id.to_string();

    conn.execute(
        "UPDATE answers SET is_answer = (id = ?1) WHERE question_id = ?2",
        [answer_id.to_string(), question_id.clone()],
    )?;
    conn.execute(
        "UPDATE questions SET has_answer = 1 WHERE id = ?1",
        [question_id],
    )?;

    Ok(Answer {
        is_answer: true,
        ..answer
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Question) {
        let db = Database::open_in_memory().unwrap();
        for name in ["alice", "bob", "carol"] {
            db.create_user(name).unwrap();
        }
        let q = db.create_question("alice", "Why Rust?", "Convince me.").unwrap();
        (db, q)
    }

    #[test]
    fn accepting_moves_the_flag() {
        let (db, q) = setup();
        let a1 = db.create_answer(q.id, "bob", "Safety").unwrap();
        let a2 = db.create_answer(q.id, "carol", "Speed").unwrap();

        db.with_conn(|conn| update_accept_answer(conn, a1.id)).unwrap();
        db.with_conn(|conn| update_accept_answer(conn, a2.id)).unwrap();

        assert!(!db.get_answer(a1.id).unwrap().is_answer);
        assert!(db.get_answer(a2.id).unwrap().is_answer);
        assert!(db.get_question(q.id).unwrap().has_answer);
        assert_eq!(db.get_accepted_answer(q.id).unwrap().map(|a| a.id), Some(a2.id));
    }

    #[test]
    fn answers_list_accepted_first() {
        let (db, q) = setup();
        let a1 = db.create_answer(q.id, "bob", "first").unwrap();
        let a2 = db.create_answer(q.id, "carol", "second").unwrap();
        let a3 = db.create_answer(q.id, "bob", "third").unwrap();
        db.with_conn(|conn| update_accept_answer(conn, a1.id)).unwrap();

        let ids: Vec<Uuid> = db.get_answers(q.id).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a1.id, a3.id, a2.id]);
    }

    #[test]
    fn answer_to_missing_question_is_not_found() {
        let (db, _) = setup();
        let err = db.create_answer(Uuid::new_v4(), "bob", "hm").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn duplicate_title_is_integrity_error() {
        let (db, _) = setup();
        let err = db.create_question("bob", "Why Rust?", "again").unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }
}
