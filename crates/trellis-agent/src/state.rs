use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trellis_core::types::{ChatMessage, Role};

/// Transcript plus auxiliary fields threaded through a graph run.
///
/// Steps only ever see a shared reference; the executor is the single writer
/// and mutates through [`State::apply`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub transcript: Vec<ChatMessage>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state seeded with one human message.
    pub fn from_human(text: impl Into<String>) -> Self {
        Self {
            transcript: vec![ChatMessage::human(text)],
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// A field rendered as text. Strings come back unquoted.
    pub fn field_str(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Merge an update: messages append, fields replace.
    pub fn apply(&mut self, update: StateUpdate) {
        self.transcript.extend(update.messages);
        self.fields.extend(update.fields);
    }

    pub fn last_human(&self) -> Option<&ChatMessage> {
        self.transcript.iter().rev().find(|m| m.role == Role::Human)
    }

    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }
}

/// Partial update returned by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(message: ChatMessage) -> Self {
        Self::new().with_message(message)
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Fold `other` into this update with the same rules as [`State::apply`].
    pub fn merge(mut self, other: StateUpdate) -> Self {
        self.messages.extend(other.messages);
        self.fields.extend(other.fields);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn u1() -> StateUpdate {
        StateUpdate::message(ChatMessage::assistant("first"))
            .with_field("generated_sql", "SELECT 1")
            .with_field("next", "data_explorer")
    }

    fn u2() -> StateUpdate {
        StateUpdate::message(ChatMessage::tool_result("c1", "execute_query", "{}"))
            .with_field("generated_sql", "SELECT 2")
    }

    #[test]
    fn apply_appends_and_replaces() {
        let mut state = State::from_human("hi");
        state.apply(u1());
        state.apply(u2());

        assert_eq!(state.transcript.len(), 3);
        assert_eq!(state.transcript[1].content, "first");
        assert_eq!(state.field_str("generated_sql").as_deref(), Some("SELECT 2"));
        assert_eq!(state.field_str("next").as_deref(), Some("data_explorer"));
    }

    #[test]
    fn merge_is_associative() {
        let base = State::from_human("q");

        let mut sequential = base.clone();
        sequential.apply(u1());
        sequential.apply(u2());

        let mut combined = base.clone();
        combined.apply(u1().merge(u2()));

        let u3 = StateUpdate::new().with_field("result_set", json!([{"n": 1}]));
        let mut left = base.clone();
        left.apply(u1().merge(u2()).merge(u3.clone()));
        let mut right = base;
        right.apply(u1().merge(u2().merge(u3)));

        assert_eq!(sequential, combined);
        assert_eq!(left, right);
    }

    #[test]
    fn field_str_renders_non_strings() {
        let mut state = State::new();
        state.apply(StateUpdate::new().with_field("count", 3));
        assert_eq!(state.field_str("count").as_deref(), Some("3"));
        assert!(state.field_str("missing").is_none());
    }

    #[test]
    fn last_messages_by_role() {
        let mut state = State::from_human("one");
        state.apply(StateUpdate::message(ChatMessage::assistant("reply")));
        state.apply(StateUpdate::message(ChatMessage::human("two")));
        assert_eq!(state.last_human().unwrap().content, "two");
        assert_eq!(state.last_assistant().unwrap().content, "reply");
        assert!(StateUpdate::new().is_empty());
    }
}
