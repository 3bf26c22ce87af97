use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;
use uuid::Uuid;

use commons_db::messages::insert_message;
use commons_db::queries::require_user;
use commons_db::{Database, StoreError};
use commons_gateway::SharedBus;
use commons_types::api::{
    Claims, ConversationResponse, SendMessageRequest, UpdatedResponse,
};
use commons_types::events::PushEvent;
use commons_types::models::{Message, User};

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// Persist a direct message and push it to the recipient's inbox group
/// once committed.
///
/// Blank bodies and messages to yourself are declined with `Ok(None)`:
/// nothing is written and nothing is sent.
pub fn send(
    db: &Database,
    bus: &SharedBus,
    sender: &str,
    recipient: &str,
    body: &str,
) -> Result<Option<Message>, StoreError> {
    if body.trim().is_empty() || sender == recipient {
        debug!("Declining message from {} to {}", sender, recipient);
        return Ok(None);
    }

    db.transaction(|uow| {
        let from = require_user(uow, sender)?;
        let to = require_user(uow, recipient)?;
        let message = insert_message(uow, &from, &to, body)?;

        let event = PushEvent::message_created(message.id, &from.username, &to.username);
        let bus = bus.clone();
        let group = to.username.clone();
        uow.on_commit(move || {
            bus.send(&group, event);
        });

        Ok(Some(message))
    })
}

// -- Handlers --

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Response> {
    let sent = blocking(&state, move |s| {
        Ok(send(&s.db, &s.bus, &claims.username, &req.to, &req.message)?)
    })
    .await?;

    Ok(match sent {
        Some(message) => (StatusCode::CREATED, Json(message)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Receiver-side refresh after a `message` push.
pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Message>> {
    let message = blocking(&state, move |s| Ok(s.db.get_message(message_id)?)).await?;
    Ok(Json(message))
}

/// The caller's latest conversation, or an empty thread with themself.
pub async fn latest_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ConversationResponse>> {
    let response = blocking(&state, move |s| {
        let active = s.db.most_recent_counterpart(&claims.username)?;
        let messages = s.db.get_conversation(&active, &claims.username)?;
        Ok(ConversationResponse { active, messages })
    })
    .await?;
    Ok(Json(response))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ConversationResponse>> {
    let response = blocking(&state, move |s| {
        // Unknown counterparts are a 404, not an empty thread.
        require_existing(&s.db, &username)?;
        let messages = s.db.get_conversation(&username, &claims.username)?;
        Ok(ConversationResponse {
            active: username,
            messages,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Mark everything `username` sent to the caller as read.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UpdatedResponse>> {
    let updated = blocking(&state, move |s| {
        require_existing(&s.db, &username)?;
        Ok(s.db.mark_conversation_read(&username, &claims.username)?)
    })
    .await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// Active users other than the caller, for the contact list.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<User>>> {
    let users = blocking(&state, move |s| Ok(s.db.active_users(&claims.username)?)).await?;
    Ok(Json(users))
}

fn require_existing(db: &Database, username: &str) -> Result<(), StoreError> {
    if db.user_exists(username)? {
        Ok(())
    } else {
        Err(StoreError::not_found("user", username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use commons_gateway::{BroadcastBus, ConnectionHandle, InMemoryBus};
    use commons_types::events::EventKey;

    fn setup() -> (Arc<Database>, SharedBus) {
        let db = Database::open_in_memory().unwrap();
        for name in ["alice", "bob", "carol"] {
            db.create_user(name).unwrap();
        }
        (Arc::new(db), Arc::new(InMemoryBus::new()))
    }

    #[test]
    fn alice_says_hello_to_bob() {
        let (db, bus) = setup();
        let (handle, mut bob_inbox) = ConnectionHandle::new();
        bus.join("bob", handle);
        let (handle, mut alice_inbox) = ConnectionHandle::new();
        bus.join("alice", handle);

        let message = send(&db, &bus, "alice", "bob", "hello").unwrap().unwrap();
        assert_eq!(message.sender.as_deref(), Some("alice"));
        assert_eq!(message.recipient.as_deref(), Some("bob"));
        assert_eq!(message.body, "hello");
        assert!(message.unread);

        assert_eq!(db.get_conversation("alice", "bob").unwrap(), vec![message.clone()]);

        let pushed = bob_inbox.try_recv().unwrap();
        assert_eq!(pushed.key, EventKey::Message);
        assert_eq!(pushed.message_id, Some(message.id));
        assert_eq!(pushed.sender.as_deref(), Some("alice"));
        assert!(bob_inbox.try_recv().is_err());
        assert!(alice_inbox.try_recv().is_err());
    }

    /// Records whether each pushed message was already readable when sent.
    struct RecordingBus {
        db: Arc<Database>,
        visible: std::sync::Mutex<Vec<bool>>,
    }

    impl BroadcastBus for RecordingBus {
        fn join(&self, _group: &str, _handle: ConnectionHandle) {}

        fn leave(&self, _group: &str, _id: commons_gateway::ConnectionId) {}

        fn send(&self, _group: &str, event: PushEvent) -> usize {
            let id = event.message_id.unwrap();
            let committed = self.db.get_message(id).is_ok();
            self.visible.lock().unwrap().push(committed);
            1
        }
    }

    #[test]
    fn push_only_fires_after_commit() {
        let (db, _) = setup();
        let recorder = Arc::new(RecordingBus {
            db: db.clone(),
            visible: Default::default(),
        });
        let bus: SharedBus = recorder.clone();

        send(&db, &bus, "alice", "bob", "hi").unwrap().unwrap();
        assert_eq!(*recorder.visible.lock().unwrap(), vec![true]);
    }

    #[test]
    fn blank_and_self_messages_are_declined() {
        let (db, bus) = setup();
        let (handle, mut rx) = ConnectionHandle::new();
        bus.join("alice", handle);

        assert!(send(&db, &bus, "alice", "bob", "   \n\t").unwrap().is_none());
        assert!(send(&db, &bus, "alice", "alice", "note to self").unwrap().is_none());

        assert!(db.get_conversation("alice", "bob").unwrap().is_empty());
        assert!(db.get_conversation("alice", "alice").unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_recipient_is_not_found_and_silent() {
        let (db, bus) = setup();
        let (handle, mut rx) = ConnectionHandle::new();
        bus.join("ghost", handle);

        let err = send(&db, &bus, "alice", "ghost", "boo").unwrap_err();
        assert!(err.is_not_found());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversized_body_rolls_back_without_push() {
        let (db, bus) = setup();
        let (handle, mut rx) = ConnectionHandle::new();
        bus.join("bob", handle);

        let err = send(&db, &bus, "alice", "bob", &"x".repeat(1001)).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert!(rx.try_recv().is_err());
        assert!(db.get_conversation("alice", "bob").unwrap().is_empty());
    }

    #[test]
    fn conversation_is_the_same_from_both_sides() {
        let (db, bus) = setup();
        send(&db, &bus, "alice", "bob", "1").unwrap();
        send(&db, &bus, "bob", "alice", "2").unwrap();
        send(&db, &bus, "carol", "bob", "noise").unwrap();
        send(&db, &bus, "alice", "bob", "3").unwrap();

        let ab = db.get_conversation("alice", "bob").unwrap();
        let ba = db.get_conversation("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        let bodies: Vec<&str> = ab.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["1", "2", "3"]);
        assert_eq!(db.most_recent_counterpart("bob").unwrap(), "alice");
    }
}
