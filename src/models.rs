use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Who authored a [`Message`]. Roles other than user/assistant found in stored
/// documents are kept verbatim so a rewrite does not alter them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    Other(String),
}

impl MessageRole {
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Other(role) => role,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MessageRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => MessageRole::User,
            // Gemini names its own turns "model"
            "assistant" | "model" => MessageRole::Assistant,
            _ => MessageRole::Other(s),
        }
    }
}

impl Serialize for MessageRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(MessageRole::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Stored form of a message read back with more than a string role and
    /// string content. Written back unchanged on rewrite.
    #[serde(skip)]
    pub preserved: Option<PreservedEntry>,
}

/// A history entry as the store returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedEntry {
    pub value: serde_json::Value,
    /// `false` when role or content could not be read as text.
    pub readable: bool,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), preserved: None }
    }

    /// Keeps `value` as the stored form of a message decoded as `role`/`content`.
    pub fn preserving(role: MessageRole, content: impl Into<String>, value: serde_json::Value, readable: bool) -> Self {
        Self {
            role,
            content: content.into(),
            preserved: Some(PreservedEntry { value, readable }),
        }
    }

    /// Whether the message can be replayed to the model as a turn.
    pub fn is_readable(&self) -> bool {
        self.preserved.as_ref().map_or(true, |p| p.readable)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// One conversation document. `last_updated` is assigned by the store on
/// write, so it is `None` on anything that has not been read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub uid: String,
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(uid: impl Into<String>, conversation_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            uid: uid.into(),
            conversation_id: conversation_id.into(),
            messages,
            last_updated: None,
        }
    }
}

/// Body of `POST /api/chat`. Both fields are optional at the parse level so
/// that missing and empty values get the same 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub firebase_initialized: bool,
    pub ai_initialized: bool,
}
