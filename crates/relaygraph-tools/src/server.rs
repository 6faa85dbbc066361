//! Serves a [`ToolRegistry`] over the line protocol.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::protocol::{
    CallToolParams, INVALID_PARAMS, INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_CALL_TOOL, METHOD_LIST_TOOLS, METHOD_NOT_FOUND, METHOD_PING,
    METHOD_SHUTDOWN, PARSE_ERROR, TOOL_NOT_FOUND,
};
use crate::registry::ToolRegistry;

/// Tool server answering JSON-RPC requests read line by line.
///
/// The loop ends on EOF or after answering `shutdown`. Logging must go to
/// stderr: stdout carries the protocol when serving stdio.
#[derive(Debug, Clone)]
pub struct ToolServer {
    name: String,
    registry: Arc<ToolRegistry>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            registry: Arc::new(registry),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve on the process's stdin/stdout.
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = %self.name, tools = self.registry.len(), "Tool server started");
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let (response, shutdown) = match self.decode(&line) {
                Ok(request) => {
                    let shutdown = request.method == METHOD_SHUTDOWN;
                    (self.handle(request).await, shutdown)
                }
                Err(response) => (response, false),
            };

            let mut out = serde_json::to_string(&response)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;

            if shutdown {
                info!(server = %self.name, "Shutdown requested");
                return Ok(());
            }
        }

        info!(server = %self.name, "Input closed, tool server stopping");
        Ok(())
    }

    fn decode(&self, line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            warn!(error = %e, "Unparseable request line");
            JsonRpcResponse::failure(None, PARSE_ERROR, format!("parse error: {e}"))
        })?;
        let id = value.get("id").and_then(Value::as_u64);
        serde_json::from_value(value).map_err(|e| {
            JsonRpcResponse::failure(id, INVALID_REQUEST, format!("invalid request: {e}"))
        })
    }

    /// Answer one request.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, id = request.id, "Handling request");
        let id = request.id;
        match request.method.as_str() {
            METHOD_PING | METHOD_SHUTDOWN => JsonRpcResponse::success(id, json!({})),
            METHOD_LIST_TOOLS => {
                let result = ListToolsResult {
                    tools: self.registry.descriptors(),
                };
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::failure(Some(id), INVALID_REQUEST, e.to_string()),
                }
            }
            METHOD_CALL_TOOL => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            return JsonRpcResponse::failure(
                                Some(id),
                                INVALID_PARAMS,
                                format!("invalid params: {e}"),
                            );
                        }
                    };
                match self.registry.get(&params.name) {
                    Some(tool) => {
                        let response = tool.call(params.arguments).await;
                        debug!(tool = %params.name, success = response.is_success(), "Tool call completed");
                        JsonRpcResponse::success(id, response.into_value())
                    }
                    None => JsonRpcResponse::failure(
                        Some(id),
                        TOOL_NOT_FOUND,
                        format!("tool not found: {}", params.name),
                    ),
                }
            }
            other => {
                JsonRpcResponse::failure(Some(id), METHOD_NOT_FOUND, format!("unknown method: {other}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use async_trait::async_trait;
    use relaygraph_core::ToolResponse;
    use rstest::rstest;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, arguments: Value) -> ToolResponse {
            ToolResponse::success(arguments)
        }
    }

    fn server() -> ToolServer {
        ToolServer::new("test", ToolRegistry::new().with_tool(Echo))
    }

    #[tokio::test]
    async fn test_call_tool() {
        let response = server()
            .handle(JsonRpcRequest::new(
                1,
                METHOD_CALL_TOOL,
                Some(json!({ "name": "echo", "arguments": { "x": 1 } })),
            ))
            .await;
        assert_eq!(response.result, Some(json!({ "result": { "x": 1 } })));
    }

    #[rstest]
    #[case::unknown_tool(METHOD_CALL_TOOL, Some(json!({ "name": "missing" })), TOOL_NOT_FOUND)]
    #[case::missing_params(METHOD_CALL_TOOL, None, INVALID_PARAMS)]
    #[case::bad_params(METHOD_CALL_TOOL, Some(json!({ "arguments": {} })), INVALID_PARAMS)]
    #[case::unknown_method("resources/list", None, METHOD_NOT_FOUND)]
    #[tokio::test]
    async fn test_protocol_errors(
        #[case] method: &str,
        #[case] params: Option<Value>,
        #[case] expected: i64,
    ) {
        let response = server()
            .handle(JsonRpcRequest::new(2, method, params))
            .await;
        assert_eq!(response.id, Some(2));
        assert_eq!(response.error.unwrap().code, expected);
    }

    #[tokio::test]
    async fn test_serve_lines_until_shutdown() {
        let (client, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let task = tokio::spawn(async move { server().serve(server_read, server_write).await });

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"not json\n\n{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":\"shutdown\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let parse_error: JsonRpcResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(parse_error.id, None);
        assert_eq!(parse_error.error.unwrap().code, PARSE_ERROR);

        let pong: JsonRpcResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(pong.id, Some(5));

        let bye: JsonRpcResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(bye.id, Some(6));

        task.await.unwrap().unwrap();
    }
}
