//! Mapping between [`Conversation`] and Firestore's typed-value JSON.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "..."}`, `{"arrayValue": {"values": [...]}}`, ...).
//! Empty arrays and maps come back without their inner key.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{Revision, StoredConversation};
use crate::errors::StoreError;
use crate::models::{Conversation, Message, MessageRole};

pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// A document as returned by `GET .../documents/{collection}/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreDocument {
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub update_time: Option<String>,
}

/// Encodes everything except `lastUpdated`, which the commit sets through a
/// server-time transform.
pub fn encode_fields(conversation: &Conversation) -> Value {
    let messages: Vec<Value> = conversation
        .messages
        .iter()
        .map(|m| match &m.preserved {
            Some(entry) => entry.value.clone(),
            None => json!({
                "mapValue": {
                    "fields": {
                        "role": { "stringValue": m.role.as_str() },
                        "content": { "stringValue": m.content },
                    }
                }
            }),
        })
        .collect();

    json!({
        "uid": { "stringValue": conversation.uid },
        "conversationId": { "stringValue": conversation.conversation_id },
        "messages": { "arrayValue": { "values": messages } },
    })
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
}

/// Reads one history entry. Anything other than a map holding exactly a
/// string `role` and a string `content` keeps its stored value, so a rewrite
/// returns it untouched.
fn decode_message(value: &Value, index: usize) -> Message {
    let fields = value
        .get("mapValue")
        .and_then(|m| m.get("fields"))
        .and_then(Value::as_object);
    let role = fields.and_then(|f| string_field(f, "role"));
    let content = fields.and_then(|f| string_field(f, "content"));

    match (role, content) {
        (Some(role), Some(content)) => {
            let role = MessageRole::from(role.to_string());
            let extra_fields = fields.is_some_and(|f| f.len() > 2);
            if extra_fields {
                Message::preserving(role, content, value.clone(), true)
            } else {
                Message::new(role, content)
            }
        }
        (role, content) => {
            warn!("Stored message {index} has no text role or content; keeping it as stored");
            Message::preserving(
                MessageRole::from(role.unwrap_or_default().to_string()),
                content.unwrap_or_default(),
                value.clone(),
                false,
            )
        }
    }
}

pub fn decode_document(
    doc: &FirestoreDocument,
    conversation_id: &str,
) -> Result<StoredConversation, StoreError> {
    let messages = match doc.fields.get("messages") {
        None => Vec::new(),
        Some(value) => value
            .get("arrayValue")
            .ok_or_else(|| StoreError::Malformed("'messages' is not an array".to_string()))?
            .get("values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| decode_message(v, i))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
    };

    let last_updated = doc
        .fields
        .get(LAST_UPDATED_FIELD)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Ok(StoredConversation {
        conversation: Conversation {
            uid: string_field(&doc.fields, "uid").unwrap_or_default().to_string(),
            conversation_id: string_field(&doc.fields, "conversationId")
                .unwrap_or(conversation_id)
                .to_string(),
            messages,
            last_updated,
        },
        revision: doc.update_time.clone().map(Revision),
    })
}
