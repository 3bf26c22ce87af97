use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
                recipient_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
                body          TEXT NOT NULL CHECK (length(body) <= 1000),
                created_at    TEXT NOT NULL,
                unread        INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_messages_pair ON messages(sender_id, recipient_id, created_at);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, created_at);
            CREATE INDEX idx_messages_unread ON messages(unread);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                actor_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                verb            TEXT NOT NULL CHECK (length(verb) = 1),
                object_kind     TEXT,
                object_id       TEXT,
                slug            TEXT NOT NULL,
                unread          INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, unread, created_at);
            CREATE INDEX idx_notifications_slug ON notifications(slug);

            CREATE TABLE questions (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title        TEXT NOT NULL UNIQUE CHECK (length(title) <= 200),
                content      TEXT NOT NULL,
                has_answer   INTEGER NOT NULL DEFAULT 0,
                total_votes  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE answers (
                id           TEXT PRIMARY KEY,
                question_id  TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content      TEXT NOT NULL,
                is_answer    INTEGER NOT NULL DEFAULT 0,
                total_votes  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_answers_question ON answers(question_id);

            CREATE TABLE votes (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                target_kind  TEXT NOT NULL CHECK (target_kind IN ('question', 'answer')),
                target_id    TEXT NOT NULL,
                value        INTEGER NOT NULL,
                created_at   TEXT NOT NULL,
                UNIQUE(user_id, target_kind, target_id)
            );

            CREATE INDEX idx_votes_target ON votes(target_kind, target_id);

            CREATE TABLE news (
                id          TEXT PRIMARY KEY,
                user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
                parent_id   TEXT REFERENCES news(id) ON DELETE CASCADE,
                content     TEXT NOT NULL CHECK (length(content) <= 280),
                reply       INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_news_parent ON news(parent_id, created_at);

            CREATE TABLE news_likes (
                news_id  TEXT NOT NULL REFERENCES news(id) ON DELETE CASCADE,
                user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (news_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
