use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use relaygraph::agents::{
    ExpertServer, KnowledgeBase, SalesDatabase, analysis_graph, assistant_graph, district_graph,
    research_graph, support_graph,
};
use relaygraph::core::config::WorkerConfig;
use relaygraph::{
    CompletionService, EchoCompletion, Graph, RelayConfig, ToolChannel, WorkerSet,
    completion_from_config,
};
use tracing::{info, warn};

use crate::error::CliResult;

/// Flows the console can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Flow {
    /// Customer support desk
    Support,
    /// Market research with report writing
    Research,
    /// Sales database analysis (SQL pipeline)
    Analyze,
    /// Sales database analysis through the remote expert
    District,
    /// Manual-grounded assistant
    Assistant,
}

impl Flow {
    pub fn title(&self) -> &'static str {
        match self {
            Flow::Support => "고객 지원 에이전트",
            Flow::Research => "시장 조사 보고서 에이전트",
            Flow::Analyze | Flow::District => "서울시 상권 분석 전문 AI 에이전트",
            Flow::Assistant => "코드크래프터스 AI 에이전트",
        }
    }

    /// Expert servers the flow talks to over stdio.
    fn experts(&self) -> &'static [ExpertServer] {
        match self {
            Flow::Research => &[ExpertServer::MarketResearch, ExpertServer::ReportWriting],
            Flow::District => &[ExpertServer::DistrictAnalysis],
            _ => &[],
        }
    }
}

/// A built flow and the workers it owns.
pub struct PreparedFlow {
    pub graph: Graph,
    workers: Option<Arc<WorkerSet>>,
}

impl PreparedFlow {
    pub async fn shutdown(self) {
        if let Some(workers) = self.workers {
            workers.stop_all().await;
        }
    }
}

/// Build `flow` with live collaborators, starting its tool workers.
pub async fn prepare(
    flow: Flow,
    config: &RelayConfig,
    config_path: Option<&Path>,
) -> CliResult<PreparedFlow> {
    let workers = if flow.experts().is_empty() {
        None
    } else {
        let set = Arc::new(WorkerSet::from_configs(&worker_configs(
            flow,
            config,
            config_path,
        )?));
        if let Err(e) = set.start_all().await {
            set.stop_all().await;
            return Err(e.into());
        }
        Some(set)
    };

    let tools: Arc<dyn ToolChannel> = match &workers {
        Some(set) => set.clone(),
        None => Arc::new(WorkerSet::new()),
    };
    let completion = completion_from_config(&config.completion)?;
    let knowledge = if flow == Flow::Assistant {
        KnowledgeBase::setup(&config.assistant.manual)?
    } else {
        Arc::new(KnowledgeBase::from_text(""))
    };

    let graph = assemble(flow, config, tools, completion, knowledge)?;
    info!(graph = graph.name(), "Flow ready");
    Ok(PreparedFlow { graph, workers })
}

/// Build `flow` with inert collaborators, for printing its topology.
pub fn outline(flow: Flow, config: &RelayConfig) -> CliResult<Graph> {
    assemble(
        flow,
        config,
        Arc::new(WorkerSet::new()),
        Arc::new(EchoCompletion),
        Arc::new(KnowledgeBase::from_text("")),
    )
}

fn assemble(
    flow: Flow,
    config: &RelayConfig,
    tools: Arc<dyn ToolChannel>,
    completion: Arc<dyn CompletionService>,
    knowledge: Arc<KnowledgeBase>,
) -> CliResult<Graph> {
    let graph = match flow {
        Flow::Support => support_graph()?,
        Flow::Research => research_graph(tools)?,
        Flow::Analyze => analysis_graph(
            Arc::new(SalesDatabase::new(&config.analysis.database)),
            completion,
        )?,
        Flow::District => district_graph(tools)?,
        Flow::Assistant => assistant_graph(knowledge, completion, config.assistant.top_k)?,
    };
    Ok(graph)
}

/// Worker for each expert: the `[[workers]]` entry of the same name, or this
/// binary's own `serve` command.
fn worker_configs(
    flow: Flow,
    config: &RelayConfig,
    config_path: Option<&Path>,
) -> CliResult<Vec<WorkerConfig>> {
    let mut configs = Vec::new();
    for server in flow.experts() {
        if let Some(worker) = config.worker(server.as_str()) {
            configs.push(worker.clone());
            continue;
        }
        let exe = std::env::current_exe()?;
        let mut args: Vec<String> = Vec::new();
        if let Some(path) = config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args.push("serve".to_string());
        args.push(server.as_str().to_string());
        warn!(server = %server, "No worker configured, using the built-in server");
        configs.push(
            WorkerConfig::new(server.as_str(), exe.display().to_string()).with_args(args),
        );
    }
    Ok(configs)
}
