//! Construction-time and run-time errors of graphs.

use relaygraph_core::{CheckpointError, HandlerError, Role, StateValidationError};
use thiserror::Error;

/// Malformed topology. Raised by [`GraphBuilder::build`](crate::GraphBuilder::build);
/// a graph that fails to build never runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("'{0}' is not a valid node name")]
    InvalidNodeName(String),

    #[error("unknown node '{name}' referenced by {referenced_by}")]
    UnknownNode { name: String, referenced_by: String },

    #[error("graph has no entry node")]
    MissingEntry,

    #[error("node '{0}' has more than one outgoing edge policy")]
    ConflictingEdges(String),

    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),

    #[error("router of node '{node}' can produce label '{label}' which has no mapping")]
    UnmappedLabel { node: String, label: String },

    #[error("mapping of node '{node}' contains label '{label}' that its router never produces")]
    UndeclaredLabel { node: String, label: String },
}

impl GraphError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GraphError::DuplicateNode(_) => "DUPLICATE_NODE",
            GraphError::InvalidNodeName(_) => "INVALID_NODE_NAME",
            GraphError::UnknownNode { .. } => "UNKNOWN_NODE",
            GraphError::MissingEntry => "MISSING_ENTRY",
            GraphError::ConflictingEdges(_) => "CONFLICTING_EDGES",
            GraphError::MissingEdge(_) => "MISSING_EDGE",
            GraphError::UnmappedLabel { .. } => "UNMAPPED_LABEL",
            GraphError::UndeclaredLabel { .. } => "UNDECLARED_LABEL",
        }
    }
}

/// A router produced a label that is not in its mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("router of node '{node}' returned label '{label}', which has no matching edge")]
pub struct RoutingError {
    pub node: String,
    pub label: String,
}

/// Why a run stopped before reaching the terminal marker.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("node '{node}' failed: {source}")]
    Handler {
        node: String,
        #[source]
        source: HandlerError,
    },

    #[error("node '{node}' returned an invalid update: {source}")]
    StateValidation {
        node: String,
        #[source]
        source: StateValidationError,
    },

    /// The starting state (initial or resumed) does not match the schema.
    #[error("starting state is invalid: {0}")]
    InvalidStartState(#[source] StateValidationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("checkpoint store failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("run exceeded the limit of {limit} steps")]
    StepLimitExceeded { limit: usize },
}

impl RunError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RunError::Handler { source, .. } => source.error_code(),
            RunError::StateValidation { .. } | RunError::InvalidStartState(_) => {
                "STATE_VALIDATION"
            }
            RunError::Routing(_) => "ROUTING",
            RunError::Graph(err) => err.error_code(),
            RunError::Checkpoint(err) => err.error_code(),
            RunError::StepLimitExceeded { .. } => "STEP_LIMIT_EXCEEDED",
        }
    }

    /// Node that was executing (or routing) when the run stopped.
    pub fn node(&self) -> Option<&str> {
        match self {
            RunError::Handler { node, .. } | RunError::StateValidation { node, .. } => Some(node),
            RunError::Routing(err) => Some(&err.node),
            _ => None,
        }
    }

    /// History role of the failure note appended to the transcript.
    pub fn note_role(&self) -> Role {
        match self {
            RunError::Handler { source, .. } => source.note_role(),
            _ => Role::Assistant,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RunError::Handler {
                source: HandlerError::Cancelled,
                ..
            }
        )
    }
}
