//! Expert tools and the servers that host them.
//!
//! Every tool takes its arguments as `{"input_data": {...}}` and answers with
//! the result/error envelope. Anything that goes wrong inside a tool, bad
//! arguments included, is reported through `{"error": ...}`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{CompletionOptions, CompletionService, ToolResponse};
use relaygraph_tools::{Tool, ToolRegistry};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::analysis::{SalesDatabase, report_prompt, sanitize_sql, sql_prompt};
use crate::district::DISTRICT_TOOL;
use crate::error::AgentError;
use crate::research::{MARKET_RESEARCH_TOOL, REPORT_WRITING_TOOL};

pub const GREETING_TOOL: &str = "create_greeting_message";

const SUPPORTED_LANGUAGES: [&str; 2] = ["한국어", "English"];

#[derive(Deserialize)]
struct Arguments<T> {
    input_data: T,
}

fn parse_input<T: DeserializeOwned>(arguments: Value) -> Result<T, String> {
    serde_json::from_value::<Arguments<T>>(arguments)
        .map(|args| args.input_data)
        .map_err(|e| format!("invalid arguments: {e}"))
}

fn input_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "input_data": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        },
        "required": ["input_data"],
    })
}

/// Log and wrap a tool failure.
fn failure(tool: &str, message: String) -> ToolResponse {
    error!(tool, %message, "Tool failed");
    ToolResponse::failure(message)
}

#[derive(Deserialize)]
struct GreetingInput {
    name: String,
    language: String,
}

/// Greets a person in one of the supported languages.
#[derive(Debug, Default)]
pub struct GreetingTool;

#[async_trait]
impl Tool for GreetingTool {
    fn name(&self) -> &str {
        GREETING_TOOL
    }

    fn description(&self) -> &str {
        "주어진 이름과 언어로 인사 메시지를 생성합니다."
    }

    fn input_schema(&self) -> Value {
        input_schema(
            json!({
                "name": { "type": "string" },
                "language": { "type": "string", "enum": SUPPORTED_LANGUAGES },
            }),
            &["name", "language"],
        )
    }

    async fn call(&self, arguments: Value) -> ToolResponse {
        let input: GreetingInput = match parse_input(arguments) {
            Ok(input) => input,
            Err(e) => return failure(GREETING_TOOL, format!("인사말 생성 중 오류 발생: {e}")),
        };
        let greeting = match input.language.as_str() {
            "한국어" => format!("안녕하세요. {}님! 만나서 반갑습니다.", input.name),
            "English" => format!("Hello, {}! It's a pleasure to meet you.", input.name),
            other => {
                return failure(
                    GREETING_TOOL,
                    format!(
                        "인사말 생성 중 오류 발생: {other}는 지원하지 않는 언어입니다. 지원되는 언어: {}",
                        SUPPORTED_LANGUAGES.join(", ")
                    ),
                );
            }
        };
        ToolResponse::success(json!({ "greeting": greeting }))
    }
}

#[derive(Deserialize)]
struct ResearchInput {
    topic: String,
}

/// Summarizes a market topic.
///
/// Findings come from the completion service; there is no web search.
pub struct MarketResearchTool {
    completion: Arc<dyn CompletionService>,
}

impl MarketResearchTool {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

fn research_prompt(topic: &str) -> String {
    format!(
        "다음 주제에 대한 최신 시장 동향과 핵심 수치를 항목별로 정리해주세요.
각 항목은 출처와 내용을 포함해야 합니다.

# 주제:
{topic}
"
    )
}

#[async_trait]
impl Tool for MarketResearchTool {
    fn name(&self) -> &str {
        MARKET_RESEARCH_TOOL
    }

    fn description(&self) -> &str {
        "주어진 주제에 대해 시장 조사를 수행하고, 분석에 필요한 핵심 정보를 요약하여 반환합니다."
    }

    fn input_schema(&self) -> Value {
        input_schema(json!({ "topic": { "type": "string" } }), &["topic"])
    }

    async fn call(&self, arguments: Value) -> ToolResponse {
        let input: ResearchInput = match parse_input(arguments) {
            Ok(input) => input,
            Err(e) => return failure(MARKET_RESEARCH_TOOL, format!("시장 조사 중 오류 발생: {e}")),
        };
        if input.topic.trim().is_empty() {
            return failure(
                MARKET_RESEARCH_TOOL,
                "시장 조사 중 오류 발생: 조사할 주제가 비어 있습니다.".to_string(),
            );
        }
        info!(topic = %input.topic, "Market research started");
        match self
            .completion
            .complete(&research_prompt(&input.topic), &CompletionOptions::default())
            .await
        {
            Ok(findings) => ToolResponse::success(json!({
                "research_summary": format!("시장 조사 및 트렌드 요약:\n\n{}", findings.trim()),
            })),
            Err(e) => failure(MARKET_RESEARCH_TOOL, format!("시장 조사 중 오류 발생: {e}")),
        }
    }
}

#[derive(Deserialize)]
struct ReportInput {
    user_query: String,
    research_summary: String,
}

/// Writes the final markdown report from a request and a research summary.
pub struct ReportWritingTool {
    completion: Arc<dyn CompletionService>,
}

impl ReportWritingTool {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

fn final_report_prompt(user_query: &str, research_summary: &str) -> String {
    format!(
        "당신은 전문 데이터 분석가이자 보고서 작성 전문가입니다.
다음은 사용자의 원본 요청과 그에 따라 수집된 데이터 요약입니다.
비교, 분석, 요약 및 제언을 포함한 상세한 최종 보고서를 마크다운 형식으로 작성해주세요.

# 원본 사용자 요청:
{user_query}

# 수집된 시장 조사 요약:
{research_summary}

# 최종 보고서 (마크다운 형식):
"
    )
}

#[async_trait]
impl Tool for ReportWritingTool {
    fn name(&self) -> &str {
        REPORT_WRITING_TOOL
    }

    fn description(&self) -> &str {
        "사용자 요청과 시장 조사 요약을 바탕으로, 최종 분석 보고서를 마크다운 형식으로 생성합니다."
    }

    fn input_schema(&self) -> Value {
        input_schema(
            json!({
                "user_query": { "type": "string" },
                "research_summary": { "type": "string" },
            }),
            &["user_query", "research_summary"],
        )
    }

    async fn call(&self, arguments: Value) -> ToolResponse {
        let input: ReportInput = match parse_input(arguments) {
            Ok(input) => input,
            Err(e) => {
                return failure(
                    REPORT_WRITING_TOOL,
                    format!("보고서 생성 중 LLM 호출 오류 발생: {e}"),
                );
            }
        };
        let prompt = final_report_prompt(&input.user_query, &input.research_summary);
        match self
            .completion
            .complete(&prompt, &CompletionOptions::default())
            .await
        {
            Ok(report_text) => ToolResponse::success(json!({ "report_text": report_text })),
            Err(e) => failure(
                REPORT_WRITING_TOOL,
                format!("보고서 생성 중 LLM 호출 오류 발생: {e}"),
            ),
        }
    }
}

#[derive(Deserialize)]
struct AnalysisInput {
    query: String,
}

/// Question in, markdown report and executed SQL out.
pub struct DistrictAnalysisTool {
    database: Arc<SalesDatabase>,
    completion: Arc<dyn CompletionService>,
}

impl DistrictAnalysisTool {
    pub fn new(database: Arc<SalesDatabase>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            database,
            completion,
        }
    }
}

#[async_trait]
impl Tool for DistrictAnalysisTool {
    fn name(&self) -> &str {
        DISTRICT_TOOL
    }

    fn description(&self) -> &str {
        "사용자의 자연어 질문을 SQL로 변환하고 데이터베이스를 조회하여, 그 결과를 바탕으로 전문적인 분석 보고서를 생성합니다."
    }

    fn input_schema(&self) -> Value {
        input_schema(json!({ "query": { "type": "string" } }), &["query"])
    }

    async fn call(&self, arguments: Value) -> ToolResponse {
        let input: AnalysisInput = match parse_input(arguments) {
            Ok(input) => input,
            Err(e) => {
                return failure(
                    DISTRICT_TOOL,
                    format!("분석 프로세스 중 예측하지 못한 오류 발생: {e}"),
                );
            }
        };
        info!(query = %input.query, "District analysis requested");

        let table_schema = match self.database.table_schema().await {
            Ok(Some(schema)) => schema,
            Ok(None) | Err(AgentError::DatabaseMissing(_)) => {
                return failure(
                    DISTRICT_TOOL,
                    format!(
                        "분석을 위한 데이터베이스 파일({})이 없습니다. 담당자가 먼저 DB를 생성해야 합니다.",
                        self.database.path().display()
                    ),
                );
            }
            Err(e) => {
                return failure(
                    DISTRICT_TOOL,
                    format!("분석 프로세스 중 예측하지 못한 오류 발생: {e}"),
                );
            }
        };

        let options = CompletionOptions::default();
        let sql = match self
            .completion
            .complete(&sql_prompt(&table_schema, &input.query), &options)
            .await
        {
            Ok(reply) => sanitize_sql(&reply),
            Err(e) => {
                return failure(
                    DISTRICT_TOOL,
                    format!("분석 프로세스 중 예측하지 못한 오류 발생: {e}"),
                );
            }
        };

        let rows = match self.database.query(&sql).await {
            Ok(rows) => rows,
            Err(e) => {
                return failure(
                    DISTRICT_TOOL,
                    format!("SQL 실행 중 오류가 발생했습니다: {e}\n실패한 쿼리: {sql}"),
                );
            }
        };

        let report = if rows.is_empty() {
            "분석 결과, 해당 조건에 맞는 데이터가 없습니다. 다른 조건으로 질문해 보시는 것은 어떨까요?"
                .to_string()
        } else {
            match self
                .completion
                .complete(&report_prompt(&input.query, &rows), &options)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    return failure(
                        DISTRICT_TOOL,
                        format!("분석 프로세스 중 예측하지 못한 오류 발생: {e}"),
                    );
                }
            }
        };
        ToolResponse::success(json!({ "report": report, "executed_sql": sql }))
    }
}

/// Tool servers the `serve` command can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertServer {
    Greeting,
    MarketResearch,
    ReportWriting,
    DistrictAnalysis,
}

impl ExpertServer {
    pub const ALL: [ExpertServer; 4] = [
        ExpertServer::Greeting,
        ExpertServer::MarketResearch,
        ExpertServer::ReportWriting,
        ExpertServer::DistrictAnalysis,
    ];

    /// Command-line name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertServer::Greeting => "greeting",
            ExpertServer::MarketResearch => "market-research",
            ExpertServer::ReportWriting => "report-writing",
            ExpertServer::DistrictAnalysis => "district-analysis",
        }
    }

    /// Name announced to clients.
    pub fn server_name(&self) -> &'static str {
        match self {
            ExpertServer::Greeting => "GreetingServer",
            ExpertServer::MarketResearch => "MarketResearchExpert",
            ExpertServer::ReportWriting => "ReportWritingExpert",
            ExpertServer::DistrictAnalysis => "DataAnalysisExpert",
        }
    }

    /// Tools hosted by this server.
    pub fn registry(
        &self,
        completion: Arc<dyn CompletionService>,
        database: Arc<SalesDatabase>,
    ) -> ToolRegistry {
        match self {
            ExpertServer::Greeting => ToolRegistry::new().with_tool(GreetingTool),
            ExpertServer::MarketResearch => {
                ToolRegistry::new().with_tool(MarketResearchTool::new(completion))
            }
            ExpertServer::ReportWriting => {
                ToolRegistry::new().with_tool(ReportWritingTool::new(completion))
            }
            ExpertServer::DistrictAnalysis => {
                ToolRegistry::new().with_tool(DistrictAnalysisTool::new(database, completion))
            }
        }
    }
}

impl fmt::Display for ExpertServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpertServer {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpertServer::ALL
            .into_iter()
            .find(|server| server.as_str() == s)
            .ok_or_else(|| AgentError::UnknownServer(s.to_string()))
    }
}
