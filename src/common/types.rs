use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

/// One message as persisted under its writer's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
}

impl StoredMessage {
    /// Builds a message stamped with the current time. The text is trimmed.
    pub fn new(text: &str) -> Self {
        Self::at(text, Utc::now().timestamp_millis())
    }

    pub fn at(text: &str, timestamp: i64) -> Self {
        Self {
            id: generate_id(timestamp),
            text: text.trim().to_string(),
            timestamp,
        }
    }
}

/// Millisecond prefix plus a short random suffix.
pub fn generate_id(timestamp: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{timestamp}-{}", &suffix[..9])
}

/// A message tagged with the writer it was stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub text: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn from_stored(username: &str, message: &StoredMessage) -> Self {
        Self {
            id: message.id.clone(),
            username: username.to_string(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        }
    }

    pub fn to_stored(&self) -> StoredMessage {
        StoredMessage {
            id: self.id.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Rendering-ready projection of a message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub id: String,
    pub username: String,
    pub text: String,
    pub color: &'static str,
}

/// The single persisted blob: writer name to that writer's messages in
/// insertion order. Writer keys keep the order they were first seen in, both
/// when parsed and when written back.
///
/// Equality ignores writer key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Document {
    writers: IndexMap<String, Vec<StoredMessage>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a document leniently. Only a non-object top level is rejected;
    /// writer entries that are not arrays and array elements that are not
    /// messages are dropped. Whatever is dropped here is gone from the backend
    /// after the next whole-document write.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let Value::Object(entries) = value else {
            return Err(StoreError::Malformed(format!(
                "expected a JSON object, found {}",
                json_kind(&value)
            )));
        };

        let mut writers = IndexMap::with_capacity(entries.len());
        for (writer, messages) in entries {
            let Value::Array(items) = messages else {
                log::warn!(
                    "Skipping non-array entry for writer `{writer}`; it will be discarded on the next overwrite"
                );
                continue;
            };
            let mut parsed = Vec::with_capacity(items.len());
            for item in items {
                match serde_json::from_value::<StoredMessage>(item) {
                    Ok(message) => parsed.push(message),
                    Err(err) => log::warn!(
                        "Skipping invalid message under `{writer}` ({err}); it will be discarded on the next overwrite"
                    ),
                }
            }
            writers.insert(writer, parsed);
        }
        Ok(Self { writers })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|err| StoreError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|err| StoreError::Malformed(err.to_string()))
    }

    /// Regroups flattened messages under their writers, preserving order.
    /// Writers are keyed in the order their first message appears.
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Self {
        let mut writers: IndexMap<String, Vec<StoredMessage>> = IndexMap::new();
        for message in messages {
            writers
                .entry(message.username.clone())
                .or_default()
                .push(message.to_stored());
        }
        Self { writers }
    }

    /// Messages of one writer; absent writers have none.
    pub fn messages_of(&self, writer: &str) -> &[StoredMessage] {
        self.writers.get(writer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, writer: &str, id: &str) -> bool {
        self.messages_of(writer).iter().any(|message| message.id == id)
    }

    /// Copy of this document with `message` appended to `writer`'s array. A
    /// new writer is added after the existing ones.
    pub fn with_appended(&self, writer: &str, message: StoredMessage) -> Self {
        let mut next = self.clone();
        next.writers
            .entry(writer.to_string())
            .or_default()
            .push(message);
        next
    }

    pub fn writers(&self) -> impl Iterator<Item = &str> {
        self.writers.keys().map(String::as_str)
    }

    /// Total number of messages across all writers.
    pub fn len(&self) -> usize {
        self.writers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All messages tagged with their writer, sorted by timestamp. The sort is
    /// stable, so equal timestamps keep document order: writer key order
    /// first, then array order.
    pub fn flatten(&self) -> Vec<ChatMessage> {
        let mut all: Vec<ChatMessage> = self
            .writers
            .iter()
            .flat_map(|(writer, messages)| {
                messages
                    .iter()
                    .map(move |message| ChatMessage::from_stored(writer, message))
            })
            .collect();
        all.sort_by_key(|message| message.timestamp);
        all
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
