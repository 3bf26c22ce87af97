use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, News, Notification};

// -- JWT Claims --

/// JWT claims shared across commons-api (REST middleware) and the gateway
/// upgrade in commons-server. Tokens are minted by the external auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Directory --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    /// Username of the other party shown as the active conversation.
    pub active: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatedResponse {
    pub updated: usize,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    #[serde(flatten)]
    pub notification: Notification,
    pub display: &'static str,
    pub icon: &'static str,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            display: notification.verb.display(),
            icon: notification.verb.icon(),
            notification,
        }
    }
}

// -- Questions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateQuestionRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAnswerRequest {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VoteValue {
    #[serde(rename = "U")]
    Up,
    #[serde(rename = "D")]
    Down,
}

impl VoteValue {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Up)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub value: VoteValue,
}

/// Either the new tally or a denial; denials are not HTTP errors.
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_owner: bool,
}

// -- News --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostNewsRequest {
    pub post: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRequest {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct LikesResponse {
    pub likes: usize,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub comments: usize,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub news: News,
    pub thread: Vec<News>,
}
