//! Mock tool channel with predictable responses.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use relaygraph_core::{ToolChannel, ToolDescriptor, ToolError};
use serde_json::{Value, json};

type Reply = Result<Value, ToolError>;

#[derive(Debug, Default)]
struct Inner {
    queued: HashMap<String, VecDeque<Reply>>,
    defaults: HashMap<String, Reply>,
    calls: Vec<(String, Value)>,
}

/// A [`ToolChannel`] that answers from canned envelopes.
///
/// Each tool has a queue of replies, consumed in order, and an optional
/// default used once the queue is empty. Calls to tools with neither fail
/// with [`ToolError::NotFound`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockToolChannel {
    inner: Arc<Mutex<Inner>>,
    latency: Option<Duration>,
}

impl MockToolChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `{"result": result}`.
    pub fn with_result(self, tool: &str, result: Value) -> Self {
        self.with_raw(tool, json!({ "result": result }))
    }

    /// Queue `{"error": message}`.
    pub fn with_error_envelope(self, tool: &str, message: &str) -> Self {
        self.with_raw(tool, json!({ "error": message }))
    }

    /// Queue an arbitrary payload, e.g. a malformed envelope.
    pub fn with_raw(self, tool: &str, payload: Value) -> Self {
        self.push(tool, Ok(payload));
        self
    }

    /// Queue a channel-level failure.
    pub fn with_failure(self, tool: &str, error: ToolError) -> Self {
        self.push(tool, Err(error));
        self
    }

    /// Default `{"result": result}` once the queue for `tool` is empty.
    pub fn with_default_result(self, tool: &str, result: Value) -> Self {
        self.lock()
            .defaults
            .insert(tool.to_string(), Ok(json!({ "result": result })));
        self
    }

    /// Delay every call, to give cancellation something to interrupt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every `(tool, payload)` received, oldest first.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn push(&self, tool: &str, reply: Reply) {
        self.lock()
            .queued
            .entry(tool.to_string())
            .or_default()
            .push_back(reply);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ToolChannel for MockToolChannel {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError> {
        let reply = {
            let mut inner = self.lock();
            inner.calls.push((tool.to_string(), payload));
            match inner.queued.get_mut(tool).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => inner
                    .defaults
                    .get(tool)
                    .cloned()
                    .unwrap_or_else(|| Err(ToolError::NotFound(tool.to_string()))),
            }
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        reply
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let inner = self.lock();
        let mut names: Vec<&String> = inner.queued.keys().chain(inner.defaults.keys()).collect();
        names.sort();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| ToolDescriptor {
                name: name.clone(),
                description: "mock tool".to_string(),
                input_schema: json!({ "type": "object" }),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_core::ToolResponse;

    #[tokio::test]
    async fn test_queue_then_default() {
        let channel = MockToolChannel::new()
            .with_error_envelope("search", "no data")
            .with_default_result("search", json!({ "hits": 0 }));

        let first = channel.call("search", json!({ "q": "a" })).await.unwrap();
        assert_eq!(first, ToolResponse::failure("no data"));
        let second = channel.call("search", json!({ "q": "b" })).await.unwrap();
        assert_eq!(second, ToolResponse::success(json!({ "hits": 0 })));

        assert_eq!(channel.calls_to("search").len(), 2);
        assert!(matches!(
            channel.invoke("other", json!({})).await,
            Err(ToolError::NotFound(_))
        ));
        assert_eq!(channel.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let channel = MockToolChannel::new().with_raw("t", json!({ "unexpected": true }));
        assert!(matches!(
            channel.call("t", json!({})).await,
            Err(ToolError::Malformed(_))
        ));
    }
}
