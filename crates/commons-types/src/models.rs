use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the shared group every notifications socket joins.
pub const NOTIFICATIONS_GROUP: &str = "notifications";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A direct message. Everything except `unread` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// `None` once the sending account has been deleted.
    pub sender: Option<String>,
    /// `None` once the receiving account has been deleted.
    pub recipient: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub unread: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub actor: String,
    pub recipient: String,
    pub verb: Verb,
    pub action_object: Option<ObjectRef>,
    pub slug: String,
    pub unread: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub user: String,
    pub target: Target,
    /// `true` is an upvote.
    pub value: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub author: String,
    pub title: String,
    pub content: String,
    pub has_answer: bool,
    pub total_votes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub author: String,
    pub content: String,
    pub is_answer: bool,
    pub total_votes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct News {
    pub id: Uuid,
    pub author: Option<String>,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub reply: bool,
    pub created_at: DateTime<Utc>,
}

/// Anything carrying a cached vote total derived from its vote set.
pub trait Votable {
    fn target(&self) -> Target;
    fn total_votes(&self) -> i64;
    /// Username of whoever wrote it; owners may not vote on their own content.
    fn owner(&self) -> &str;
}

impl Votable for Question {
    fn target(&self) -> Target {
        Target::Question(self.id)
    }

    fn total_votes(&self) -> i64 {
        self.total_votes
    }

    fn owner(&self) -> &str {
        &self.author
    }
}

impl Votable for Answer {
    fn target(&self) -> Target {
        Target::Answer(self.id)
    }

    fn total_votes(&self) -> i64 {
        self.total_votes
    }

    fn owner(&self) -> &str {
        &self.author
    }
}

/// What a vote points at. Both variants carry a `total_votes` cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Question(Uuid),
    Answer(Uuid),
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Question(_) => "question",
            Self::Answer(_) => "answer",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Question(id) | Self::Answer(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "question" => Some(Self::Question(id)),
            "answer" => Some(Self::Answer(id)),
            _ => None,
        }
    }
}

/// The object a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ObjectRef {
    News(Uuid),
    Question(Uuid),
    Answer(Uuid),
}

impl ObjectRef {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::News(_) => "news",
            Self::Question(_) => "question",
            Self::Answer(_) => "answer",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::News(id) | Self::Question(id) | Self::Answer(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "news" => Some(Self::News(id)),
            "question" => Some(Self::Question(id)),
            "answer" => Some(Self::Answer(id)),
            _ => None,
        }
    }
}

impl From<Target> for ObjectRef {
    fn from(target: Target) -> Self {
        match target {
            Target::Question(id) => Self::Question(id),
            Target::Answer(id) => Self::Answer(id),
        }
    }
}

/// Closed set of notification verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Liked,
    Commented,
    Favorited,
    Answered,
    AcceptedAnswer,
    Edited,
    AlsoCommented,
    LoggedIn,
    LoggedOut,
    Voted,
    Shared,
    SignedUp,
    Replied,
}

impl Verb {
    pub const ALL: [Verb; 13] = [
        Verb::Liked,
        Verb::Commented,
        Verb::Favorited,
        Verb::Answered,
        Verb::AcceptedAnswer,
        Verb::Edited,
        Verb::AlsoCommented,
        Verb::LoggedIn,
        Verb::LoggedOut,
        Verb::Voted,
        Verb::Shared,
        Verb::SignedUp,
        Verb::Replied,
    ];

    /// Single-letter storage code.
    pub fn code(&self) -> char {
        match self {
            Self::Liked => 'L',
            Self::Commented => 'C',
            Self::Favorited => 'F',
            Self::Answered => 'A',
            Self::AcceptedAnswer => 'W',
            Self::Edited => 'E',
            Self::AlsoCommented => 'K',
            Self::LoggedIn => 'I',
            Self::LoggedOut => 'O',
            Self::Voted => 'V',
            Self::Shared => 'S',
            Self::SignedUp => 'U',
            Self::Replied => 'R',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.code() == code)
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Commented => "commented",
            Self::Favorited => "favorited",
            Self::Answered => "answered",
            Self::AcceptedAnswer => "accepted",
            Self::Edited => "edited",
            Self::AlsoCommented => "also commented",
            Self::LoggedIn => "logged in",
            Self::LoggedOut => "logged out",
            Self::Voted => "voted on",
            Self::Shared => "shared",
            Self::SignedUp => "created an account",
            Self::Replied => "replied to",
        }
    }

    /// Font Awesome icon hint for clients.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Commented | Self::Answered | Self::AlsoCommented => "fa-comment",
            Self::LoggedIn | Self::SignedUp | Self::LoggedOut => "fa-users",
            Self::Liked => "fa-heart",
            Self::Favorited => "fa-star",
            Self::AcceptedAnswer => "fa-check-circle",
            Self::Edited => "fa-pencil",
            Self::Voted => "fa-plus",
            Self::Shared => "fa-share-alt",
            Self::Replied => "fa-reply",
        }
    }
}

/// The two logical socket endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Per-user inbox, grouped by username.
    Inbox,
    /// Shared group for site-wide notifications.
    Notifications,
}

impl Channel {
    pub fn group_for(&self, username: &str) -> String {
        match self {
            Self::Inbox => username.to_string(),
            Self::Notifications => NOTIFICATIONS_GROUP.to_string(),
        }
    }
}
