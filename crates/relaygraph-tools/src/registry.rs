use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{ToolChannel, ToolDescriptor, ToolError, ToolResponse};
use serde_json::{Value, json};
use tracing::debug;

/// A named operation answering with a result/error envelope.
///
/// Tool-level failures (bad arguments, missing data, a failed upstream call)
/// are reported as [`ToolResponse::Failure`], never as a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn call(&self, arguments: Value) -> ToolResponse;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Tools indexed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool using the builder pattern. A tool with the same name is
    /// replaced.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolResponse, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        debug!(tool = %name, "Calling local tool");
        let response = tool.call(arguments).await;
        debug!(tool = %name, success = response.is_success(), "Tool call completed");
        Ok(response)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-process [`ToolChannel`] over a registry.
#[derive(Debug, Clone)]
pub struct LocalToolChannel {
    registry: Arc<ToolRegistry>,
}

impl LocalToolChannel {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl ToolChannel for LocalToolChannel {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError> {
        Ok(self.registry.call(tool, payload).await?.into_value())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self.registry.descriptors())
    }
}
