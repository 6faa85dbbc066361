//! The state record threaded through a run and the partial updates nodes
//! return.
//!
//! A [`State`] holds an append-only `history` plus named fields. Nodes never
//! mutate a state directly; they return a [`StateUpdate`] which the executor
//! validates against the graph's [`StateSchema`](crate::schema::StateSchema)
//! and then merges with [`State::apply`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StateValidationError;
use crate::message::{Message, Role};

/// Name of the reserved, append-only history field.
pub const HISTORY_FIELD: &str = "history";

/// Shared record of one run.
///
/// Serialized as a flat JSON object: `history` next to the named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    history: Vec<Message>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a record from a single trigger message.
    pub fn from_message(message: Message) -> Self {
        Self::new().with_message(message)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.history.push(message);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    /// Most recent entry authored by the user.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.role == Role::User)
    }

    /// Content of the most recent user entry, or `""` when there is none.
    pub fn latest_user_text(&self) -> &str {
        self.last_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Decode a field into a typed value. `Ok(None)` when the field is unset
    /// or null.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StateValidationError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                StateValidationError::ShapeMismatch {
                    field: name.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                    found: e.to_string(),
                }
            }),
        }
    }

    /// Merge a partial update: history entries are appended in order, every
    /// other field present in the update replaces the current value.
    pub fn apply(&mut self, update: StateUpdate) {
        self.history.extend(update.messages);
        for (name, value) in update.fields {
            self.fields.insert(name, value);
        }
    }

    /// Append a single entry, used for failure notes.
    pub fn append_message(&mut self, message: Message) {
        self.history.push(message);
    }

    pub(crate) fn fields_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.fields
    }
}

/// Partial update returned by a node handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one history entry.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Overwrite a named field.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn new_messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn changed_fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_appends_history_and_overwrites_fields() {
        let mut state = State::from_message(Message::user("first"))
            .with_field("status", "pending")
            .with_field("tags", json!(["a", "b"]));

        state.apply(
            StateUpdate::new()
                .message(Message::assistant("one"))
                .message(Message::assistant("two"))
                .set("tags", json!(["c"])),
        );

        let contents: Vec<_> = state.history().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "one", "two"]);
        // whole-value replacement, no element merge
        assert_eq!(state.get("tags"), Some(&json!(["c"])));
        assert_eq!(state.get_str("status"), Some("pending"));
    }

    #[test]
    fn test_empty_update_is_a_no_op() {
        let mut state = State::from_message(Message::user("hi")).with_field("n", 1);
        let before = state.clone();
        state.apply(StateUpdate::new());
        assert_eq!(state, before);
    }

    #[test]
    fn test_latest_user_text_skips_assistant_entries() {
        let state = State::from_message(Message::user("환불해 주세요"))
            .with_message(Message::assistant("분석 중"));
        assert_eq!(state.latest_user_text(), "환불해 주세요");
        assert_eq!(State::new().latest_user_text(), "");
    }

    #[test]
    fn test_serializes_flat() {
        let state = State::from_message(Message::user("hi")).with_field("user_query", "hi");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            json!({"history": [{"role": "user", "content": "hi"}], "user_query": "hi"})
        );
        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_get_as() {
        let state = State::new()
            .with_field("rows", json!([{"district": "강남"}]))
            .with_field("summary", Value::Null);
        let rows: Vec<BTreeMap<String, String>> = state.get_as("rows").unwrap().unwrap();
        assert_eq!(rows[0]["district"], "강남");
        assert_eq!(state.get_as::<String>("summary").unwrap(), None);
        assert!(state.get_as::<i64>("rows").is_err());
    }
}
