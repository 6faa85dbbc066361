//! Thin client for the remote district analysis expert.
//!
//! A single node forwards the latest question to `analyze_commercial_district`
//! and renders whatever comes back, report or error, as the answer.

use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{HandlerError, Message, State, StateUpdate, ToolChannel, ToolResponse};
use relaygraph_graph::{END, Graph, NodeHandler};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::analysis::render_report;
use crate::error::AgentResult;
use crate::research::call_expert;

pub const CALL_ANALYSIS: &str = "call_analysis";
pub const DISTRICT_TOOL: &str = "analyze_commercial_district";

pub fn district_graph(tools: Arc<dyn ToolChannel>) -> AgentResult<Graph> {
    let graph = Graph::builder("district")
        .node(CALL_ANALYSIS, CallAnalysis { tools })
        .entry(CALL_ANALYSIS)
        .edge(CALL_ANALYSIS, END)
        .build()?;
    Ok(graph)
}

struct CallAnalysis {
    tools: Arc<dyn ToolChannel>,
}

#[async_trait]
impl NodeHandler for CallAnalysis {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let query = state.latest_user_text();
        info!(%query, "Requesting district analysis");
        let payload = json!({ "input_data": { "query": query } });
        let content = match call_expert(self.tools.as_ref(), DISTRICT_TOOL, payload).await? {
            ToolResponse::Success(result) => {
                let text = |key: &str, missing: &'static str| {
                    result
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or(missing)
                        .to_string()
                };
                render_report(
                    &text("report", "보고서 내용이 없습니다."),
                    &text("executed_sql", "실행된 SQL 정보가 없습니다."),
                )
            }
            ToolResponse::Failure(error) => {
                warn!(tool = DISTRICT_TOOL, %error, "District analysis failed");
                format!("### 분석 중 오류 발생\n- **오류 내용:** {error}")
            }
        };
        Ok(StateUpdate::new().message(Message::assistant(content)))
    }
}
