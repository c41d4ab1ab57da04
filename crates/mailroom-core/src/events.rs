use nostr_sdk::Timestamp;
use serde::Serialize;

use crate::models::Message;

/// Domain change published on the live feed. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MessageReceived {
        id: String,
        sender: String,
        subject: String,
        timestamp: u64,
    },
    MessageDeleted {
        id: String,
        timestamp: u64,
    },
    LabelAdded {
        message_id: String,
        label: String,
        timestamp: u64,
    },
    LabelRemoved {
        message_id: String,
        label: String,
        timestamp: u64,
    },
}

impl ChangeEvent {
    pub fn received(message: &Message) -> Self {
        ChangeEvent::MessageReceived {
            id: message.id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            timestamp: message.created_at,
        }
    }

    pub fn deleted(id: &str) -> Self {
        ChangeEvent::MessageDeleted {
            id: id.to_string(),
            timestamp: Timestamp::now().as_u64(),
        }
    }

    pub fn label_added(message_id: &str, label: &str) -> Self {
        ChangeEvent::LabelAdded {
            message_id: message_id.to_string(),
            label: label.to_string(),
            timestamp: Timestamp::now().as_u64(),
        }
    }

    pub fn label_removed(message_id: &str, label: &str) -> Self {
        ChangeEvent::LabelRemoved {
            message_id: message_id.to_string(),
            label: label.to_string(),
            timestamp: Timestamp::now().as_u64(),
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            ChangeEvent::MessageReceived { id, .. } | ChangeEvent::MessageDeleted { id, .. } => id,
            ChangeEvent::LabelAdded { message_id, .. }
            | ChangeEvent::LabelRemoved { message_id, .. } => message_id,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ChangeEvent::LabelAdded { label, .. } | ChangeEvent::LabelRemoved { label, .. } => {
                Some(label)
            }
            _ => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            ChangeEvent::MessageReceived { timestamp, .. }
            | ChangeEvent::MessageDeleted { timestamp, .. }
            | ChangeEvent::LabelAdded { timestamp, .. }
            | ChangeEvent::LabelRemoved { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = ChangeEvent::LabelAdded {
            message_id: "m1".to_string(),
            label: "flag:starred".to_string(),
            timestamp: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "label_added");
        assert_eq!(json["message_id"], "m1");
        assert_eq!(event.label(), Some("flag:starred"));
        assert_eq!(event.timestamp(), 42);
    }

    #[test]
    fn test_received_uses_message_fields() {
        let message = Message {
            id: "m1".to_string(),
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            subject: "Hi".to_string(),
            body_text: String::new(),
            created_at: 100,
            raw_body: String::new(),
        };
        let event = ChangeEvent::received(&message);
        assert_eq!(event.message_id(), "m1");
        assert_eq!(event.timestamp(), 100);
        assert_eq!(event.label(), None);
    }
}
