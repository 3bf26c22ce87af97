//! Directory registration. Credentials live with the external auth
//! service; this only records the username so it can be addressed.

use axum::{Json, extract::State, http::StatusCode};

use commons_db::Database;
use commons_db::queries::{insert_user, query_user_by_username};
use commons_gateway::SharedBus;
use commons_types::api::CreateUserRequest;
use commons_types::events::EventKey;
use commons_types::models::{NOTIFICATIONS_GROUP, User, Verb};

use crate::error::{ApiError, ApiResult};
use crate::notify::{Notice, Recipients, notify};
use crate::state::{AppState, blocking};

/// Register `username` and tell every active user about it.
pub fn create_user(db: &Database, bus: &SharedBus, username: &str) -> ApiResult<User> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) || username.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest(
            "Username must be 3-32 characters without spaces.".into(),
        ));
    }
    // Inbox groups are keyed by username and must not alias the shared group.
    if username.eq_ignore_ascii_case(NOTIFICATIONS_GROUP) {
        return Err(ApiError::BadRequest("Username is reserved.".into()));
    }

    db.transaction(|uow| {
        if query_user_by_username(uow, username)?.is_some() {
            return Err(ApiError::BadRequest("Username is taken.".into()));
        }
        let user = insert_user(uow, username)?;
        notify(
            uow,
            bus,
            &user,
            &Recipients::Global,
            &Notice::new(Verb::SignedUp, EventKey::NewUser),
        )?;
        Ok(user)
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = blocking(&state, move |s| create_user(&s.db, &s.bus, &req.username)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
