use std::time::Duration;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use commons_api::middleware::{bearer_token, decode_token, require_auth};
use commons_api::{AppState, messenger, news, notifications, questions, users, votes};
use commons_gateway::connection::{self, Gateway, Identity};
use commons_types::models::Channel;

#[derive(Clone)]
pub struct ServerState {
    pub app: AppState,
    pub gateway: Gateway,
    pub heartbeat: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub fn router(app: AppState, heartbeat: Duration) -> Router {
    let state = ServerState {
        gateway: Gateway::new(app.bus.clone()),
        app: app.clone(),
        heartbeat,
    };

    let public_routes = Router::new()
        .route("/users", post(users::register))
        .with_state(app.clone());

    let protected_routes = Router::new()
        .route("/contacts", get(messenger::list_contacts))
        .route("/messages", post(messenger::send_message))
        .route("/messages/{message_id}", get(messenger::get_message))
        .route("/conversations", get(messenger::latest_conversation))
        .route("/conversations/{username}", get(messenger::get_conversation))
        .route("/conversations/{username}/read", post(messenger::mark_conversation_read))
        .route("/notifications", get(notifications::list_unread))
        .route("/notifications/latest", get(notifications::latest))
        .route("/notifications/read", post(notifications::mark_all_read))
        .route("/notifications/{slug}/read", post(notifications::mark_read))
        .route("/notifications/{slug}/unread", post(notifications::mark_unread))
        .route("/questions", post(questions::create_question))
        .route(
            "/questions/{question_id}/answers",
            get(questions::list_answers).post(questions::create_answer),
        )
        .route("/questions/{question_id}/vote", post(votes::vote_question))
        .route("/answers/{answer_id}/vote", post(votes::vote_answer))
        .route("/answers/{answer_id}/accept", post(votes::accept))
        .route("/news", get(news::feed).post(news::create))
        .route("/news/{news_id}/reply", post(news::create_reply))
        .route("/news/{news_id}/like", post(news::toggle))
        .route("/news/{news_id}/thread", get(news::thread))
        .layer(middleware::from_fn_with_state(app.clone(), require_auth))
        .with_state(app);

    let ws_routes = Router::new()
        .route("/ws/notifications/", get(ws_notifications))
        .route("/ws/{username}/", get(ws_inbox))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Identity for a socket upgrade. Browsers cannot set headers on a
/// WebSocket, so `?token=` is accepted as well.
fn authenticate(state: &ServerState, headers: &HeaderMap, query: &TokenQuery) -> Option<Identity> {
    let token = bearer_token(headers).or(query.token.as_deref())?;
    decode_token(&state.app.jwt_secret, token).map(|claims| Identity {
        user_id: claims.sub,
        username: claims.username,
    })
}

async fn ws_notifications(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = authenticate(&state, &headers, &query);
    upgrade(state, ws, identity, Channel::Notifications)
}

/// The path names an inbox, but a socket only ever joins its own user's
/// group.
async fn ws_inbox(
    State(state): State<ServerState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = authenticate(&state, &headers, &query);
    if let Some(identity) = &identity {
        if identity.username != username {
            debug!("{} opened inbox socket at /ws/{}/", identity.username, username);
        }
    }
    upgrade(state, ws, identity, Channel::Inbox)
}

fn upgrade(
    state: ServerState,
    ws: WebSocketUpgrade,
    identity: Option<Identity>,
    channel: Channel,
) -> impl IntoResponse {
    // Join before the upgrade completes so nothing sent afterwards is missed.
    let session = state.gateway.connect(identity, channel);
    let heartbeat = state.heartbeat;
    ws.on_upgrade(move |socket| connection::serve(socket, session, heartbeat))
}
