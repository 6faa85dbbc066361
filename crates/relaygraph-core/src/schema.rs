//! Declared shape of a state record.
//!
//! Every named field of a [`State`] has a [`FieldShape`] and a default value.
//! The executor checks each node's update with [`StateSchema::check_update`]
//! before merging, and normalizes initial and resumed records with
//! [`StateSchema::conform`]. Nothing is coerced: a value either has the
//! declared shape or the check fails.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::StateValidationError;
use crate::state::{HISTORY_FIELD, State, StateUpdate};

/// Shape a field value must have.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    Text,
    Integer,
    Number,
    Boolean,
    /// Any JSON value.
    Json,
    /// Any JSON object.
    Object,
    List(Box<FieldShape>),
    /// `null` or the inner shape.
    Optional(Box<FieldShape>),
    /// One of a fixed set of text values.
    OneOf(Vec<String>),
}

impl FieldShape {
    pub fn list(item: FieldShape) -> Self {
        FieldShape::List(Box::new(item))
    }

    pub fn optional(inner: FieldShape) -> Self {
        FieldShape::Optional(Box::new(inner))
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldShape::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldShape::Text => value.is_string(),
            FieldShape::Integer => value.is_i64() || value.is_u64(),
            FieldShape::Number => value.is_number(),
            FieldShape::Boolean => value.is_boolean(),
            FieldShape::Json => true,
            FieldShape::Object => value.is_object(),
            FieldShape::List(item) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| item.accepts(v))),
            FieldShape::Optional(inner) => value.is_null() || inner.accepts(value),
            FieldShape::OneOf(values) => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v == s)),
        }
    }

    /// Value used when a record does not set the field.
    pub fn default_value(&self) -> Value {
        match self {
            FieldShape::Text => Value::String(String::new()),
            FieldShape::Integer => Value::from(0),
            FieldShape::Number => Value::from(0.0),
            FieldShape::Boolean => Value::Bool(false),
            FieldShape::Json | FieldShape::Optional(_) => Value::Null,
            FieldShape::Object => Value::Object(serde_json::Map::new()),
            FieldShape::List(_) => Value::Array(Vec::new()),
            FieldShape::OneOf(values) => values
                .first()
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldShape::Text => "text".to_string(),
            FieldShape::Integer => "integer".to_string(),
            FieldShape::Number => "number".to_string(),
            FieldShape::Boolean => "boolean".to_string(),
            FieldShape::Json => "json".to_string(),
            FieldShape::Object => "object".to_string(),
            FieldShape::List(item) => format!("list of {}", item.describe()),
            FieldShape::Optional(inner) => format!("optional {}", inner.describe()),
            FieldShape::OneOf(values) => format!("one of [{}]", values.join(", ")),
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) if n.is_f64() => "number".to_string(),
        Value::Number(_) => "integer".to_string(),
        Value::String(s) => format!("text \"{}\"", truncate(s, 32)),
        Value::Array(_) => "list".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Declaration of one named field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub shape: FieldShape,
    pub default: Value,
}

/// The set of named fields a state record may carry, besides `history`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn builder() -> StateSchemaBuilder {
        StateSchemaBuilder::default()
    }

    /// Schema with no named fields; records carry only their history.
    pub fn history_only() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// A record holding every field at its default and an empty history.
    pub fn initial_state(&self) -> State {
        let mut state = State::new();
        for (name, spec) in &self.fields {
            state.fields_mut().insert(name.clone(), spec.default.clone());
        }
        state
    }

    /// Check a whole record and fill unset fields with their defaults.
    pub fn conform(&self, mut state: State) -> Result<State, StateValidationError> {
        for (name, value) in state.fields() {
            self.check_field(name, value)?;
        }
        for (name, spec) in &self.fields {
            state
                .fields_mut()
                .entry(name.clone())
                .or_insert_with(|| spec.default.clone());
        }
        Ok(state)
    }

    /// Check a node's update before it is merged.
    pub fn check_update(&self, update: &StateUpdate) -> Result<(), StateValidationError> {
        for (name, value) in update.changed_fields() {
            self.check_field(name, value)?;
        }
        Ok(())
    }

    fn check_field(&self, name: &str, value: &Value) -> Result<(), StateValidationError> {
        if name == HISTORY_FIELD {
            return Err(StateValidationError::ReservedField(name.to_string()));
        }
        let spec = self
            .fields
            .get(name)
            .ok_or_else(|| StateValidationError::UnknownField(name.to_string()))?;
        if spec.shape.accepts(value) {
            Ok(())
        } else {
            Err(StateValidationError::ShapeMismatch {
                field: name.to_string(),
                expected: spec.shape.describe(),
                found: describe_value(value),
            })
        }
    }
}

/// Builder for [`StateSchema`].
#[derive(Debug, Default)]
pub struct StateSchemaBuilder {
    fields: Vec<(String, FieldSpec)>,
}

impl StateSchemaBuilder {
    /// Declare a field whose default comes from its shape.
    pub fn field(self, name: impl Into<String>, shape: FieldShape) -> Self {
        let default = shape.default_value();
        self.field_with_default(name, shape, default)
    }

    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        shape: FieldShape,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FieldSpec {
                shape,
                default: default.into(),
            },
        ));
        self
    }

    pub fn build(self) -> Result<StateSchema, StateValidationError> {
        let mut fields = BTreeMap::new();
        for (name, spec) in self.fields {
            if name == HISTORY_FIELD {
                return Err(StateValidationError::ReservedField(name));
            }
            if !spec.shape.accepts(&spec.default) {
                return Err(StateValidationError::ShapeMismatch {
                    expected: spec.shape.describe(),
                    found: describe_value(&spec.default),
                    field: name,
                });
            }
            if fields.contains_key(&name) {
                return Err(StateValidationError::DuplicateField(name));
            }
            fields.insert(name, spec);
        }
        Ok(StateSchema { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use serde_json::json;

    fn support_schema() -> StateSchema {
        StateSchema::builder()
            .field_with_default(
                "inquiry_type",
                FieldShape::one_of(["unknown", "product", "payment"]),
                "unknown",
            )
            .field("feedback_needed", FieldShape::Boolean)
            .field("research_summary", FieldShape::optional(FieldShape::Text))
            .field("rows", FieldShape::list(FieldShape::Object))
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_state_uses_defaults() {
        let state = support_schema().initial_state();
        assert_eq!(state.get_str("inquiry_type"), Some("unknown"));
        assert_eq!(state.get_bool("feedback_needed"), Some(false));
        assert_eq!(state.get("research_summary"), Some(&Value::Null));
        assert_eq!(state.get("rows"), Some(&json!([])));
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_conform_fills_missing_fields() {
        let schema = support_schema();
        let state = State::from_message(Message::user("hi")).with_field("feedback_needed", true);
        let state = schema.conform(state).unwrap();
        assert_eq!(state.get_bool("feedback_needed"), Some(true));
        assert_eq!(state.get_str("inquiry_type"), Some("unknown"));
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_conform_rejects_unknown_fields() {
        let state = State::new().with_field("mood", "happy");
        assert_eq!(
            support_schema().conform(state).unwrap_err(),
            StateValidationError::UnknownField("mood".into())
        );
    }

    #[test]
    fn test_check_update_rejects_shape_violations() {
        let schema = support_schema();
        let err = schema
            .check_update(&StateUpdate::new().set("inquiry_type", "refund"))
            .unwrap_err();
        assert!(matches!(
            err,
            StateValidationError::ShapeMismatch { ref field, .. } if field == "inquiry_type"
        ));

        let err = schema
            .check_update(&StateUpdate::new().set("feedback_needed", "yes"))
            .unwrap_err();
        assert_eq!(err.to_string(), "field 'feedback_needed' expects boolean, got text \"yes\"");

        assert!(
            schema
                .check_update(&StateUpdate::new().set("rows", json!([{"a": 1}, 2])))
                .is_err()
        );
    }

    #[test]
    fn test_check_update_accepts_valid_values() {
        let schema = support_schema();
        let update = StateUpdate::new()
            .message(Message::assistant("ok"))
            .set("inquiry_type", "payment")
            .set("research_summary", Value::Null)
            .set("rows", json!([{"district_name": "강남"}]));
        assert!(schema.check_update(&update).is_ok());
    }

    #[test]
    fn test_history_is_reserved() {
        let schema = support_schema();
        assert_eq!(
            schema
                .check_update(&StateUpdate::new().set("history", json!([])))
                .unwrap_err(),
            StateValidationError::ReservedField("history".into())
        );
        assert!(
            StateSchema::builder()
                .field("history", FieldShape::Json)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_builder_rejects_bad_declarations() {
        let err = StateSchema::builder()
            .field("a", FieldShape::Text)
            .field("a", FieldShape::Integer)
            .build()
            .unwrap_err();
        assert_eq!(err, StateValidationError::DuplicateField("a".into()));

        let err = StateSchema::builder()
            .field_with_default("count", FieldShape::Integer, "zero")
            .build()
            .unwrap_err();
        assert!(matches!(err, StateValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_integer_and_number_shapes() {
        assert!(FieldShape::Integer.accepts(&json!(3)));
        assert!(!FieldShape::Integer.accepts(&json!(3.5)));
        assert!(FieldShape::Number.accepts(&json!(3)));
        assert!(FieldShape::Number.accepts(&json!(3.5)));
    }
}
