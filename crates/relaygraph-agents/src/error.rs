use std::path::PathBuf;

use relaygraph_core::StateValidationError;
use relaygraph_graph::GraphError;
use thiserror::Error;

/// Failure to assemble a flow or one of its resources.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid state schema: {0}")]
    Schema(#[from] StateValidationError),

    #[error("database file {} does not exist", .0.display())]
    DatabaseMissing(PathBuf),

    #[error("database error: {0}")]
    Database(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manual {} contains no text", .0.display())]
    EmptyManual(PathBuf),

    #[error("unknown expert server '{0}'")]
    UnknownServer(String),
}

impl AgentError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Graph(e) => e.error_code(),
            AgentError::Schema(e) => e.error_code(),
            AgentError::DatabaseMissing(_) => "DATABASE_MISSING",
            AgentError::Database(_) => "DATABASE_ERROR",
            AgentError::Io { .. } => "IO_ERROR",
            AgentError::EmptyManual(_) => "EMPTY_MANUAL",
            AgentError::UnknownServer(_) => "UNKNOWN_SERVER",
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Database(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
