use axum::{
    Extension, Json,
    extract::{Path, State},
};

use commons_db::StoreError;
use commons_db::notifications::MOST_RECENT_LIMIT;
use commons_types::api::{Claims, NotificationResponse, UpdatedResponse};
use commons_types::models::Notification;

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

fn respond(rows: Vec<Notification>) -> Json<Vec<NotificationResponse>> {
    Json(rows.into_iter().map(NotificationResponse::from).collect())
}

pub async fn list_unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let rows = blocking(&state, move |s| Ok(s.db.unread_notifications(&claims.username)?)).await?;
    Ok(respond(rows))
}

/// Newest unread notifications for the dropdown, capped at five.
pub async fn latest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let rows = blocking(&state, move |s| {
        Ok(s.db.most_recent_notifications(&claims.username, MOST_RECENT_LIMIT)?)
    })
    .await?;
    Ok(respond(rows))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UpdatedResponse>> {
    let updated = blocking(&state, move |s| {
        Ok(s.db.mark_all_notifications_read(Some(&claims.username))?)
    })
    .await?;
    Ok(Json(UpdatedResponse { updated }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UpdatedResponse>> {
    set_unread(state, slug, claims, false).await
}

pub async fn mark_unread(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UpdatedResponse>> {
    set_unread(state, slug, claims, true).await
}

async fn set_unread(
    state: AppState,
    slug: String,
    claims: Claims,
    unread: bool,
) -> ApiResult<Json<UpdatedResponse>> {
    let changed = blocking(&state, move |s| {
        let notification = s.db.get_notification_by_slug(&slug)?;
        // Someone else's notification looks the same as a missing one.
        if notification.recipient != claims.username {
            return Err(StoreError::not_found("notification", slug).into());
        }
        let changed = if unread {
            s.db.mark_notification_unread(notification.id)?
        } else {
            s.db.mark_notification_read(notification.id)?
        };
        Ok(changed)
    })
    .await?;
    Ok(Json(UpdatedResponse {
        updated: usize::from(changed),
    }))
}
