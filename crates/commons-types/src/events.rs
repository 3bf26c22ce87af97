use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator on every server-originated push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushType {
    #[default]
    Receive,
}

/// What happened. Clients switch on this to decide what to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKey {
    /// A direct message landed in the recipient's inbox.
    Message,
    /// A new top-level news post exists.
    AdditionalNews,
    /// Likes/replies/acceptances on something the recipient owns.
    SocialUpdate,
    /// A user joined the site.
    NewUser,
    /// Generic fallback key.
    Notification,
}

/// Payload carried over the bus and re-serialized verbatim to sockets.
///
/// Optional fields are omitted from the JSON rather than sent as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type", default)]
    pub kind: PushType,
    pub key: EventKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_value: Option<String>,
}

impl PushEvent {
    fn bare(key: EventKey) -> Self {
        Self {
            kind: PushType::Receive,
            key,
            message_id: None,
            sender: None,
            actor_name: None,
            recipient: None,
            id_value: None,
        }
    }

    pub fn message_created(message_id: Uuid, sender: &str, recipient: &str) -> Self {
        Self {
            message_id: Some(message_id),
            sender: Some(sender.to_string()),
            recipient: Some(recipient.to_string()),
            ..Self::bare(EventKey::Message)
        }
    }

    pub fn notification(
        key: EventKey,
        actor: &str,
        id_value: Option<String>,
        recipient: Option<&str>,
    ) -> Self {
        Self {
            actor_name: Some(actor.to_string()),
            id_value,
            recipient: recipient.map(str::to_string),
            ..Self::bare(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted() {
        let event = PushEvent::notification(EventKey::AdditionalNews, "alice", None, None);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "receive");
        assert_eq!(json["key"], "additional_news");
        assert_eq!(json["actor_name"], "alice");
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("recipient"));
        assert!(!obj.contains_key("id_value"));
        assert!(!obj.contains_key("message_id"));
    }

    #[test]
    fn message_event_shape() {
        let id = Uuid::new_v4();
        let event = PushEvent::message_created(id, "alice", "bob");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["key"], "message");
        assert_eq!(json["message_id"], id.to_string());
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["recipient"], "bob");
        assert!(!json.as_object().unwrap().contains_key("actor_name"));
    }
}
