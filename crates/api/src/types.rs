use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::ids::{AssistantId, ChatId};

/// Backend message type, intentionally decoupled from UI-layer message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantRecord {
    pub id: AssistantId,
    #[serde(default)]
    pub name: String,
    // Assistant editor fields the thread never reads but must echo back on chat updates.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantRecord {
    pub fn new(id: impl Into<AssistantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub assistants: Vec<AssistantRecord>,
    // Tools, documents and other chat fields pass through `PUT /chats/{id}` untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRecord {
    pub fn new(id: impl Into<ChatId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            assistants: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_assistants(mut self, assistants: Vec<AssistantRecord>) -> Self {
        self.assistants = assistants;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,
}

impl MessageRecord {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            sender: Some(sender.into()),
            text: text.into(),
            timestamp: None,
            message_type: Some(message_type),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Number(value)) => Ok(Some(value.to_string())),
        // Date arrays and objects are still a timestamp, just not one we format.
        Some(other) => Ok(Some(other.to_string())),
    }
}
