//! Seoul commercial district analysis over a SQLite sales database.
//!
//! `generate_sql -> execute_sql -> generate_report -> END`: the completion
//! service turns the question into a query against `quarterly_sales`, the
//! query runs read-only, and the rows are written up as a markdown report
//! followed by the SQL that produced them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{
    CompletionOptions, CompletionService, FieldShape, HandlerError, Message, State, StateSchema,
    StateUpdate,
};
use relaygraph_graph::{END, Graph, NodeHandler};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};

pub const GENERATE_SQL: &str = "generate_sql";
pub const EXECUTE_SQL: &str = "execute_sql";
pub const GENERATE_REPORT: &str = "generate_report";

pub const SALES_TABLE: &str = "quarterly_sales";

pub const NO_DATA_REPORT: &str = "분석 결과, 해당 조건에 맞는 데이터가 없습니다.";
const MISSING_TABLE: &str = "테이블 정보를 찾을 수 없습니다.";

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Handle on the sales database file.
///
/// Every operation opens its own read-only connection on the blocking pool,
/// so the handle is cheap to share and generated SQL can never write.
#[derive(Debug, Clone)]
pub struct SalesDatabase {
    path: PathBuf,
}

impl SalesDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// `CREATE TABLE` statement of the sales table, if present.
    pub async fn table_schema(&self) -> AgentResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [SALES_TABLE],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
    }

    pub async fn query(&self, sql: &str) -> AgentResult<Vec<Row>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let rows = stmt
                .query_map([], |row| row_to_json(row, &columns))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> AgentResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if !self.exists() {
            return Err(AgentError::DatabaseMissing(self.path.clone()));
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            f(&conn)
        })
        .await
        .map_err(|e| AgentError::Database(format!("database task failed: {e}")))?
        .map_err(AgentError::from)
    }
}

fn row_to_json(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut object = Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
        };
        object.insert(name.clone(), value);
    }
    Ok(object)
}

/// Prompt asking for a single SQLite query answering `question`.
pub fn sql_prompt(table_schema: &str, question: &str) -> String {
    format!(
        "당신은 대한민국 서울시 상권분석 전문가이자 SQL 마스터입니다.
아래 DB 스키마와 컬럼 의미를 참고하여, 사용자 질문에 가장 적합한 SQLite 쿼리를 생성해주세요.

### 데이터베이스 스키마:
{table_schema}

### 주요 컬럼 의미 (영문 컬럼명 -> 한글 의미):
- year_quarter: 기준년도분기 (예: '20241' = 2024년 1분기)
- district_name: 상권명
- service_category_name: 서비스 업종명
- monthly_sales_amount: 월평균 추정 매출액
- monthly_sales_count: 월평균 추정 매출 건수
- midweek_sales_amount: 주중 매출액
- weekend_sales_amount: 주말 매출액
- sales_time_11_14: 점심시간(11시~14시) 매출액
- sales_time_17_21: 저녁시간(17시~21시) 매출액
- male_sales_amount: 남성 매출액
- female_sales_amount: 여성 매출액
- sales_by_age_30s: 30대 연령층의 매출액

### 사용자의 질문:
{question}

다른 설명 없이 오직 실행 가능한 SQLite 쿼리만 생성해주세요.
"
    )
}

/// Prompt asking for a markdown report over the query result.
pub fn report_prompt(question: &str, rows: &[Row]) -> String {
    let data = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    format!(
        "당신은 전문 데이터 분석가이자 보고서 작성가입니다.
다음은 사용자의 원본 질문과 데이터베이스에서 추출한 분석 결과입니다.
데이터를 단순히 나열하지 말고, 질문 의도에 맞춰 비교 및 분석한 상세한 보고서를 마크다운 형식으로 작성해주세요.

### 원본 사용자 질문:
{question}

### 데이터베이스 조회 결과 (JSON 형식):
{data}

### 최종 분석 보고서 (마크다운 형식):
"
    )
}

/// Strip code fences and a leading `sql` language tag from a completion.
pub fn sanitize_sql(text: &str) -> String {
    let text = text.replace('`', "");
    let text = text.trim();
    let text = match text.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => &text[3..],
        _ => text,
    };
    text.trim().to_string()
}

/// Final answer: the report followed by the query that produced it.
pub fn render_report(report: &str, sql: &str) -> String {
    format!("### 분석 보고서\n{report}\n\n---\n\n### 실행된 SQL 쿼리\n```sql\n{sql}\n```")
}

pub fn analysis_schema() -> AgentResult<StateSchema> {
    Ok(StateSchema::builder()
        .field("original_query", FieldShape::Text)
        .field("sql_query", FieldShape::Text)
        .field("sql_result", FieldShape::list(FieldShape::Object))
        .build()?)
}

pub fn analysis_graph(
    database: Arc<SalesDatabase>,
    completion: Arc<dyn CompletionService>,
) -> AgentResult<Graph> {
    let graph = Graph::builder("analysis")
        .schema(analysis_schema()?)
        .node(
            GENERATE_SQL,
            GenerateSql {
                database: database.clone(),
                completion: completion.clone(),
            },
        )
        .node(EXECUTE_SQL, ExecuteSql { database })
        .node(GENERATE_REPORT, GenerateReport { completion })
        .entry(GENERATE_SQL)
        .edge(GENERATE_SQL, EXECUTE_SQL)
        .edge(EXECUTE_SQL, GENERATE_REPORT)
        .edge(GENERATE_REPORT, END)
        .build()?;
    Ok(graph)
}

struct GenerateSql {
    database: Arc<SalesDatabase>,
    completion: Arc<dyn CompletionService>,
}

#[async_trait]
impl NodeHandler for GenerateSql {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let question = state.latest_user_text();
        let table_schema = match self.database.table_schema().await {
            Ok(schema) => schema.unwrap_or_else(|| MISSING_TABLE.to_string()),
            Err(AgentError::DatabaseMissing(path)) => {
                return Err(HandlerError::failed(format!(
                    "데이터베이스 파일({})이 없습니다.",
                    path.display()
                )));
            }
            Err(e) => return Err(HandlerError::failed(e.to_string())),
        };

        let reply = self
            .completion
            .complete(&sql_prompt(&table_schema, question), &CompletionOptions::default())
            .await?;
        let sql = sanitize_sql(&reply);
        debug!(%sql, "Generated SQL");
        Ok(StateUpdate::new()
            .set("original_query", question)
            .set("sql_query", sql))
    }
}

struct ExecuteSql {
    database: Arc<SalesDatabase>,
}

#[async_trait]
impl NodeHandler for ExecuteSql {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let sql = state.get_str("sql_query").unwrap_or_default();
        let rows = self
            .database
            .query(sql)
            .await
            .map_err(|e| HandlerError::failed(format!("SQL 실행 오류: {e}")))?;
        info!(rows = rows.len(), "SQL executed");
        let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        Ok(StateUpdate::new().set("sql_result", rows))
    }
}

struct GenerateReport {
    completion: Arc<dyn CompletionService>,
}

#[async_trait]
impl NodeHandler for GenerateReport {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let rows: Vec<Row> = state
            .get_as("sql_result")
            .map_err(|e| HandlerError::failed(e.to_string()))?
            .unwrap_or_default();
        let question = state.get_str("original_query").unwrap_or_default();
        let report = if rows.is_empty() {
            NO_DATA_REPORT.to_string()
        } else {
            self.completion
                .complete(&report_prompt(question, &rows), &CompletionOptions::default())
                .await?
        };
        let sql = state.get_str("sql_query").unwrap_or_default();
        Ok(StateUpdate::new().message(Message::assistant(render_report(&report, sql))))
    }
}
