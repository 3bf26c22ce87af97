use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use commons_db::Database;
use commons_db::news::{insert_news, query_count_likes, require_news, thread_root, toggle_like};
use commons_db::queries::require_user;
use commons_gateway::SharedBus;
use commons_types::api::{
    Claims, CommentsResponse, LikesResponse, PostNewsRequest, ReplyRequest, ThreadResponse,
};
use commons_types::events::{EventKey, PushEvent};
use commons_types::models::{NOTIFICATIONS_GROUP, News, ObjectRef, Verb};

use crate::error::{ApiError, ApiResult};
use crate::notify::{Notice, Recipients, notify};
use crate::state::{AppState, blocking};

pub const MAX_NEWS_LEN: usize = 280;
const FEED_PAGE: u32 = 15;

fn validate(text: &str) -> ApiResult<&str> {
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 {
        return Err(ApiError::BadRequest("Text cannot be empty.".into()));
    }
    if len > MAX_NEWS_LEN {
        return Err(ApiError::BadRequest(format!(
            "Text is {} characters longer than accepted.",
            len - MAX_NEWS_LEN
        )));
    }
    Ok(text)
}

/// Publish a top-level post. Every notifications socket hears about it
/// after commit.
pub fn post_news(db: &Database, bus: &SharedBus, author: &str, content: &str) -> ApiResult<News> {
    let content = validate(content)?;

    db.transaction(|uow| {
        let author = require_user(uow, author)?;
        let news = insert_news(uow, &author, content, None)?;

        let event = PushEvent::notification(EventKey::AdditionalNews, &author.username, None, None);
        let bus = bus.clone();
        uow.on_commit(move || {
            bus.send(NOTIFICATIONS_GROUP, event);
        });

        info!("{} posted news {}", author.username, news.id);
        Ok(news)
    })
}

/// Reply under the thread that `parent_id` belongs to. The thread's author
/// is notified unless they are replying to themselves.
pub fn reply(db: &Database, bus: &SharedBus, parent_id: Uuid, author: &str, text: &str) -> ApiResult<News> {
    let text = validate(text)?;

    db.transaction(|uow| {
        let root = thread_root(uow, parent_id)?;
        let author = require_user(uow, author)?;
        let reply = insert_news(uow, &author, text, Some(root.id))?;

        if let Some(owner) = root.author.filter(|owner| *owner != author.username) {
            notify(
                uow,
                bus,
                &author,
                &Recipients::Single(owner),
                &Notice::new(Verb::Replied, EventKey::SocialUpdate)
                    .target(root.id)
                    .object(ObjectRef::News(reply.id)),
            )?;
        }
        Ok(reply)
    })
}

/// Flip `username`'s like on a post and return the new like count. Adding a
/// like to someone else's post notifies its author.
pub fn like(db: &Database, bus: &SharedBus, news_id: Uuid, username: &str) -> ApiResult<usize> {
    db.transaction(|uow| {
        let news = require_news(uow, news_id)?;
        let liker = require_user(uow, username)?;
        let liked = toggle_like(uow, news.id, &liker)?;

        if liked {
            if let Some(owner) = news.author.filter(|owner| *owner != liker.username) {
                notify(
                    uow,
                    bus,
                    &liker,
                    &Recipients::Single(owner),
                    &Notice::new(Verb::Liked, EventKey::SocialUpdate)
                        .target(news.id)
                        .object(ObjectRef::News(news.id)),
                )?;
            }
        }
        Ok(query_count_likes(uow, news.id)?)
    })
}

// -- Handlers --

pub async fn feed(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Vec<News>>> {
    let news = blocking(&state, |s| Ok(s.db.get_feed(FEED_PAGE)?)).await?;
    Ok(Json(news))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostNewsRequest>,
) -> ApiResult<(StatusCode, Json<News>)> {
    let news = blocking(&state, move |s| post_news(&s.db, &s.bus, &claims.username, &req.post)).await?;
    Ok((StatusCode::CREATED, Json(news)))
}

pub async fn create_reply(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<Json<CommentsResponse>> {
    let comments = blocking(&state, move |s| {
        reply(&s.db, &s.bus, news_id, &claims.username, &req.reply)?;
        Ok(s.db.count_comments(news_id)?)
    })
    .await?;
    Ok(Json(CommentsResponse { comments }))
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<LikesResponse>> {
    let likes = blocking(&state, move |s| like(&s.db, &s.bus, news_id, &claims.username)).await?;
    Ok(Json(LikesResponse { likes }))
}

pub async fn thread(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<ThreadResponse>> {
    let response = blocking(&state, move |s| {
        Ok(ThreadResponse {
            news: s.db.get_news(news_id)?,
            thread: s.db.get_thread(news_id)?,
        })
    })
    .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use commons_gateway::{ConnectionHandle, InMemoryBus};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (Database, SharedBus, UnboundedReceiver<PushEvent>) {
        let db = Database::open_in_memory().unwrap();
        for name in ["alice", "bob"] {
            db.create_user(name).unwrap();
        }
        let bus: SharedBus = Arc::new(InMemoryBus::new());
        let (handle, rx) = ConnectionHandle::new();
        bus.join(NOTIFICATIONS_GROUP, handle);
        (db, bus, rx)
    }

    #[test]
    fn posting_announces_additional_news() {
        let (db, bus, mut rx) = setup();
        let news = post_news(&db, &bus, "alice", "  hello world  ").unwrap();
        assert_eq!(news.content, "hello world");
        assert!(!news.reply);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, EventKey::AdditionalNews);
        assert_eq!(event.actor_name.as_deref(), Some("alice"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn post_length_is_bounded() {
        let (db, bus, mut rx) = setup();
        assert!(matches!(post_news(&db, &bus, "alice", "   "), Err(ApiError::BadRequest(_))));

        let err = post_news(&db, &bus, "alice", &"z".repeat(283)).unwrap_err();
        assert_eq!(err.to_string(), "Text is 3 characters longer than accepted.");

        assert!(post_news(&db, &bus, "alice", &"z".repeat(280)).is_ok());
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), 1);
    }

    #[test]
    fn replies_notify_the_thread_author() {
        let (db, bus, mut rx) = setup();
        let root = post_news(&db, &bus, "alice", "root").unwrap();
        rx.try_recv().unwrap();

        let r1 = reply(&db, &bus, root.id, "bob", "first").unwrap();
        // Replying to a reply still hangs off the root.
        let r2 = reply(&db, &bus, r1.id, "bob", "second").unwrap();
        assert_eq!(r2.parent_id, Some(root.id));
        assert_eq!(db.count_comments(root.id).unwrap(), 2);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, EventKey::SocialUpdate);
        assert_eq!(event.recipient.as_deref(), Some("alice"));
        assert_eq!(event.id_value, Some(root.id.to_string()));

        let notes = db.unread_notifications("alice").unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.verb == Verb::Replied));
    }

    #[test]
    fn self_replies_are_silent() {
        let (db, bus, mut rx) = setup();
        let root = post_news(&db, &bus, "alice", "root").unwrap();
        rx.try_recv().unwrap();

        reply(&db, &bus, root.id, "alice", "me again").unwrap();
        assert!(rx.try_recv().is_err());
        assert!(db.unread_notifications("alice").unwrap().is_empty());
        assert_eq!(db.get_thread(root.id).unwrap().len(), 1);
    }

    #[test]
    fn likes_toggle_and_notify_only_when_added() {
        let (db, bus, mut rx) = setup();
        let post = post_news(&db, &bus, "alice", "like me").unwrap();
        rx.try_recv().unwrap();

        assert_eq!(like(&db, &bus, post.id, "bob").unwrap(), 1);
        assert_eq!(like(&db, &bus, post.id, "bob").unwrap(), 0);
        assert_eq!(like(&db, &bus, post.id, "alice").unwrap(), 1);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor_name.as_deref(), Some("bob"));
        assert_eq!(db.unread_notifications("alice").unwrap()[0].verb, Verb::Liked);
    }

    #[test]
    fn liking_missing_news_is_not_found() {
        let (db, bus, _rx) = setup();
        assert!(matches!(
            like(&db, &bus, Uuid::new_v4(), "bob"),
            Err(ApiError::NotFound(_))
        ));
    }
}
