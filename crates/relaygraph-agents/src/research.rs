//! Market research orchestrator.
//!
//! A supervisor hands a fresh user request to the market research expert,
//! then to the report writer, and stops once the report is in the history.
//! Every node writes `next_node`; a [`FieldRouter`] on that field is the
//! only routing policy.
//!
//! Expert failures reported through the `{"error": ...}` envelope become an
//! assistant message and end the run normally. Channel failures and
//! malformed envelopes abort the run.

use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{
    FieldShape, HandlerError, Message, State, StateSchema, StateUpdate, ToolChannel, ToolResponse,
};
use relaygraph_graph::{FieldRouter, Graph, NodeHandler, handler_fn};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::AgentResult;

pub const SUPERVISOR: &str = "supervisor";
pub const CALL_MARKET_RESEARCH: &str = "call_market_research";
pub const CALL_REPORT_WRITING: &str = "call_report_writing";
/// `next_node` value that ends the run.
pub const NEXT_END: &str = "end";

pub const MARKET_RESEARCH_TOOL: &str = "conduct_market_research";
pub const REPORT_WRITING_TOOL: &str = "write_final_report";

pub fn research_schema() -> AgentResult<StateSchema> {
    Ok(StateSchema::builder()
        .field(
            "research_summary",
            FieldShape::optional(FieldShape::Text),
        )
        .field("user_query", FieldShape::Text)
        .field("next_node", FieldShape::Text)
        .build()?)
}

/// Build the orchestrator around a channel reaching both experts.
pub fn research_graph(tools: Arc<dyn ToolChannel>) -> AgentResult<Graph> {
    let router = || {
        FieldRouter::new("next_node", [SUPERVISOR, CALL_MARKET_RESEARCH, CALL_REPORT_WRITING])
            .with_end_value(NEXT_END)
    };
    let graph = Graph::builder("research")
        .schema(research_schema()?)
        .node(SUPERVISOR, supervisor_node())
        .node(
            CALL_MARKET_RESEARCH,
            MarketResearchNode {
                tools: tools.clone(),
            },
        )
        .node(CALL_REPORT_WRITING, ReportWritingNode { tools })
        .entry(SUPERVISOR)
        .route_by_label(SUPERVISOR, router())
        .route_by_label(CALL_MARKET_RESEARCH, router())
        .route_by_label(CALL_REPORT_WRITING, router())
        .build()?;
    Ok(graph)
}

/// Starts a research round when the newest history entry is a user request;
/// anything else means the previous round is finished.
fn supervisor_node() -> impl NodeHandler {
    handler_fn(|state: &State| {
        match state.last_message() {
            Some(message) if message.is_user() => {
                debug!(query = %message.content, "Supervisor starting research");
                Ok(StateUpdate::new()
                    .set("research_summary", Value::Null)
                    .set("user_query", message.content.clone())
                    .set("next_node", CALL_MARKET_RESEARCH))
            }
            _ => Ok(StateUpdate::new().set("next_node", NEXT_END)),
        }
    })
}

struct MarketResearchNode {
    tools: Arc<dyn ToolChannel>,
}

#[async_trait]
impl NodeHandler for MarketResearchNode {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let topic = state.get_str("user_query").unwrap_or_default();
        let payload = json!({ "input_data": { "topic": topic } });
        match call_expert(self.tools.as_ref(), MARKET_RESEARCH_TOOL, payload).await? {
            ToolResponse::Success(result) => {
                let summary = required_text(MARKET_RESEARCH_TOOL, &result, "research_summary")?;
                Ok(StateUpdate::new()
                    .set("research_summary", summary)
                    .set("next_node", CALL_REPORT_WRITING))
            }
            ToolResponse::Failure(error) => {
                warn!(tool = MARKET_RESEARCH_TOOL, %error, "Market research failed");
                Ok(StateUpdate::new()
                    .message(Message::assistant(format!("시장 조사 실패: {error}")))
                    .set("next_node", NEXT_END))
            }
        }
    }
}

struct ReportWritingNode {
    tools: Arc<dyn ToolChannel>,
}

#[async_trait]
impl NodeHandler for ReportWritingNode {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let payload = json!({
            "input_data": {
                "user_query": state.get_str("user_query").unwrap_or_default(),
                "research_summary": state.get_str("research_summary").unwrap_or_default(),
            }
        });
        match call_expert(self.tools.as_ref(), REPORT_WRITING_TOOL, payload).await? {
            ToolResponse::Success(result) => {
                let report = required_text(REPORT_WRITING_TOOL, &result, "report_text")?;
                Ok(StateUpdate::new()
                    .message(Message::assistant(report))
                    .set("next_node", SUPERVISOR))
            }
            ToolResponse::Failure(error) => {
                warn!(tool = REPORT_WRITING_TOOL, %error, "Report writing failed");
                Ok(StateUpdate::new()
                    .message(Message::assistant(format!("보고서 작성 실패: {error}")))
                    .set("next_node", NEXT_END))
            }
        }
    }
}

pub(crate) async fn call_expert(
    tools: &dyn ToolChannel,
    tool: &str,
    payload: Value,
) -> Result<ToolResponse, HandlerError> {
    tools
        .call(tool, payload)
        .await
        .map_err(|e| e.into_handler_error(tool))
}

/// A text field every successful result of `tool` must carry.
pub(crate) fn required_text(tool: &str, result: &Value, key: &str) -> Result<String, HandlerError> {
    result
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HandlerError::MalformedToolResponse {
            tool: tool.to_string(),
            detail: format!("result has no text field '{key}'"),
        })
}
