use relaygraph::agents::AgentError;
use relaygraph::{
    CheckpointError, CompletionError, ConfigError, InvalidSessionId, SessionId, ToolError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("tool workers failed: {0}")]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Session(#[from] InvalidSessionId),

    #[error("no checkpoint for session '{0}'")]
    SessionNotFound(SessionId),

    #[error("run aborted ({0})")]
    RunAborted(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
