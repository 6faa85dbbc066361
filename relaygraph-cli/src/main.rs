use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use relaygraph::agents::{ExpertServer, SalesDatabase};
use relaygraph::core::config::LogFormat;
use relaygraph::{
    Executor, ExecutorConfig, RelayConfig, SessionId, ToolServer, completion_from_config,
    open_store,
};
use tracing_subscriber::EnvFilter;

mod console;
mod error;
mod flows;
mod sessions;

use error::CliResult;
use flows::Flow;
use sessions::SessionCommands;

/// Read when `--config` is not given and the file exists.
const DEFAULT_CONFIG: &str = "relaygraph.toml";

#[derive(Parser, Debug)]
#[command(name = "relaygraph", version)]
#[command(about = "relaygraph - graph-routed agent flows, tool servers and sessions")]
struct Cli {
    /// Configuration file (default: ./relaygraph.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session to resume or create (default: a fresh id)
    #[arg(long, global = true)]
    session: Option<SessionId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Customer support desk
    Support(RunArgs),
    /// Market research with report writing
    Research(RunArgs),
    /// Sales database analysis (SQL pipeline)
    Analyze(RunArgs),
    /// Sales database analysis through the remote expert
    District(RunArgs),
    /// Manual-grounded assistant
    Assistant(RunArgs),
    /// Serve an expert tool server on stdio
    Serve {
        /// greeting | market-research | report-writing | district-analysis
        server: ExpertServer,
    },
    /// Inspect the checkpoint store
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Print a flow's nodes and edges
    Graph {
        #[arg(value_enum)]
        flow: Flow,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Run a single turn with this message instead of the console loop
    #[arg(long)]
    once: Option<String>,
}

impl Commands {
    fn flow(&self) -> Option<(Flow, &RunArgs)> {
        match self {
            Commands::Support(args) => Some((Flow::Support, args)),
            Commands::Research(args) => Some((Flow::Research, args)),
            Commands::Analyze(args) => Some((Flow::Analyze, args)),
            Commands::District(args) => Some((Flow::District, args)),
            Commands::Assistant(args) => Some((Flow::Assistant, args)),
            _ => None,
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<RelayConfig> {
    let config = match path {
        Some(path) => RelayConfig::load_from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => RelayConfig::load_from_file(DEFAULT_CONFIG)?,
        None => RelayConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Logs go to stderr: stdout carries console output, or the tool protocol
/// in `serve` mode.
fn init_logging(config: &RelayConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.compact().try_init(),
    };
}

async fn run(cli: Cli, config: RelayConfig) -> CliResult<()> {
    if let Some((flow, args)) = cli.command.flow() {
        let store = open_store(&config.checkpoint)?;
        let executor = Executor::new()
            .with_checkpoint_store(store)
            .with_config(ExecutorConfig::from(&config.executor));
        let session = cli.session.clone().unwrap_or_else(SessionId::generate);
        let prepared = flows::prepare(flow, &config, cli.config.as_deref()).await?;

        let result = match &args.once {
            Some(text) => console::once(&executor, &prepared.graph, &session, text).await,
            None => {
                console::interactive(&executor, &prepared.graph, &session, flow.title()).await
            }
        };
        prepared.shutdown().await;
        return result;
    }

    match cli.command {
        Commands::Serve { server } => {
            let completion = completion_from_config(&config.completion)?;
            let database = Arc::new(SalesDatabase::new(&config.analysis.database));
            let registry = server.registry(completion, database);
            tracing::info!(server = server.server_name(), tools = registry.len(), "Serving on stdio");
            ToolServer::new(server.server_name(), registry)
                .serve_stdio()
                .await?;
        }
        Commands::Sessions { command } => {
            sessions::run(open_store(&config.checkpoint)?, command).await?;
        }
        Commands::Graph { flow } => {
            print!("{}", flows::outline(flow, &config)?);
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_flow_command() {
        let cli = Cli::try_parse_from([
            "relaygraph",
            "--session",
            "user-1234",
            "support",
            "--once",
            "환불 요청",
        ])
        .unwrap();
        assert_eq!(cli.session.unwrap().as_str(), "user-1234");
        let (flow, args) = cli.command.flow().unwrap();
        assert_eq!(flow, Flow::Support);
        assert_eq!(args.once.as_deref(), Some("환불 요청"));
    }

    #[test]
    fn test_parse_serve_and_graph() {
        let cli = Cli::try_parse_from(["relaygraph", "serve", "market-research"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { server: ExpertServer::MarketResearch }
        ));
        assert!(Cli::try_parse_from(["relaygraph", "serve", "weather"]).is_err());

        let cli = Cli::try_parse_from(["relaygraph", "graph", "district"]).unwrap();
        assert!(matches!(cli.command, Commands::Graph { flow: Flow::District }));
    }

    #[test]
    fn test_invalid_session_rejected() {
        assert!(Cli::try_parse_from(["relaygraph", "--session", "../x", "support"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "relaygraph",
            "sessions",
            "--config",
            "relay.toml",
            "show",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nmax_steps = 7\n[logging]\nformat = \"text\"").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.executor.max_steps, 7);
        assert_eq!(config.logging.format, LogFormat::Text);

        assert!(load_config(Some(Path::new("/nonexistent/relay.toml"))).is_err());
    }
}
