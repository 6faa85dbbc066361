//! Boundary to external tools.
//!
//! Every tool answers with one of two JSON envelopes:
//!
//! ```json
//! {"result": {"research_summary": "..."}}
//! {"error": "no data"}
//! ```
//!
//! [`ToolResponse`] is the typed form of that envelope. Callers branch on it
//! instead of assuming success.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ToolError;

/// Decoded tool envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    /// `{"result": ...}`
    Success(Value),
    /// `{"error": "..."}`
    Failure(String),
}

impl ToolResponse {
    pub fn success(result: impl Into<Value>) -> Self {
        ToolResponse::Success(result.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ToolResponse::Failure(message.into())
    }

    /// Decode an envelope. Exactly one of `result` and `error` must be present
    /// at the top level of a JSON object.
    pub fn from_value(value: Value) -> Result<Self, ToolError> {
        let Value::Object(mut map) = value else {
            return Err(ToolError::Malformed(format!(
                "expected a JSON object, got {}",
                kind_of(&value)
            )));
        };
        match (map.remove("result"), map.remove("error")) {
            (Some(result), None) => Ok(ToolResponse::Success(result)),
            (None, Some(Value::String(message))) => Ok(ToolResponse::Failure(message)),
            (None, Some(Value::Null)) => Err(ToolError::Malformed("error is null".to_string())),
            (None, Some(other)) => Ok(ToolResponse::Failure(other.to_string())),
            (Some(_), Some(_)) => Err(ToolError::Malformed(
                "both 'result' and 'error' present".to_string(),
            )),
            (None, None) => Err(ToolError::Malformed(
                "neither 'result' nor 'error' present".to_string(),
            )),
        }
    }

    /// Decode an envelope carried as text.
    pub fn parse(text: &str) -> Result<Self, ToolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ToolError::Malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn into_value(self) -> Value {
        match self {
            ToolResponse::Success(result) => json!({ "result": result }),
            ToolResponse::Failure(message) => json!({ "error": message }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }

    /// Text field of a successful result, e.g. `result.report_text`.
    pub fn result_str(&self, key: &str) -> Option<&str> {
        match self {
            ToolResponse::Success(result) => result.get(key).and_then(Value::as_str),
            ToolResponse::Failure(_) => None,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Advertised tool metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

/// Request/response channel to tools, JSON in and JSON out.
///
/// `invoke` returns the raw envelope; `Err` is reserved for channel-level
/// failures (transport, timeout, unknown tool).
#[async_trait]
pub trait ToolChannel: Send + Sync {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke and decode the envelope in one step.
    async fn call(&self, tool: &str, payload: Value) -> Result<ToolResponse, ToolError> {
        let raw = self.invoke(tool, payload).await?;
        ToolResponse::from_value(raw)
    }
}

#[async_trait]
impl<T: ToolChannel + ?Sized> ToolChannel for Arc<T> {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError> {
        (**self).invoke(tool, payload).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        (**self).list_tools().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let resp = ToolResponse::from_value(json!({"result": {"report_text": "done"}})).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.result_str("report_text"), Some("done"));
        assert_eq!(resp.result_str("missing"), None);
    }

    #[test]
    fn test_error_envelope() {
        let resp = ToolResponse::parse(r#"{"error": "no data"}"#).unwrap();
        assert_eq!(resp, ToolResponse::Failure("no data".into()));
        assert_eq!(resp.result_str("report_text"), None);
    }

    #[test]
    fn test_non_text_error_is_stringified() {
        let resp = ToolResponse::from_value(json!({"error": {"code": 7}})).unwrap();
        assert_eq!(resp, ToolResponse::Failure(r#"{"code":7}"#.into()));
    }

    #[test]
    fn test_malformed_envelopes() {
        assert!(matches!(
            ToolResponse::parse("not json"),
            Err(ToolError::Malformed(_))
        ));
        assert!(ToolResponse::from_value(json!(["result"])).is_err());
        assert!(ToolResponse::from_value(json!({"data": 1})).is_err());
        assert!(ToolResponse::from_value(json!({"result": 1, "error": "x"})).is_err());
        assert!(ToolResponse::from_value(json!({"error": null})).is_err());
    }

    #[test]
    fn test_into_value_matches_wire_shape() {
        assert_eq!(
            ToolResponse::failure("boom").into_value(),
            json!({"error": "boom"})
        );
        assert_eq!(
            ToolResponse::success(json!({"greeting": "hi"})).into_value(),
            json!({"result": {"greeting": "hi"}})
        );
    }
}
