//! Error types shared by every relaygraph crate.
//!
//! Run-time failures of a node are funnelled into [`HandlerError`]; the
//! collaborator-specific errors ([`CompletionError`], [`ToolError`]) convert
//! into it so node handlers can use `?` on any external call.

use thiserror::Error;

use crate::message::Role;

/// Failure of a node handler, usually caused by its external call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    /// The text-completion service failed.
    #[error("completion failed: {0}")]
    Completion(String),

    /// A tool call failed at the channel level (not a `{"error"}` response).
    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// A tool channel produced something other than a result/error envelope.
    #[error("malformed response from tool '{tool}': {detail}")]
    MalformedToolResponse { tool: String, detail: String },

    /// The external call exceeded its deadline.
    #[error("timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The host cancelled the suspended call.
    #[error("cancelled by the host")]
    Cancelled,

    /// Any other failure raised by the handler itself.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience constructor for handler-local failures.
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    /// History role used when this failure is reported in the transcript.
    pub fn note_role(&self) -> Role {
        match self {
            HandlerError::Tool { .. } | HandlerError::MalformedToolResponse { .. } => Role::Tool,
            _ => Role::Assistant,
        }
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            HandlerError::Completion(_) => "COMPLETION_FAILED",
            HandlerError::Tool { .. } => "TOOL_FAILED",
            HandlerError::MalformedToolResponse { .. } => "MALFORMED_TOOL_RESPONSE",
            HandlerError::Timeout { .. } => "TIMEOUT",
            HandlerError::Cancelled => "CANCELLED",
            HandlerError::Failed(_) => "HANDLER_FAILED",
        }
    }
}

/// A state record or update does not match the declared schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateValidationError {
    /// The field is not declared by the schema.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// The value does not have the declared shape.
    #[error("field '{field}' expects {expected}, got {found}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// `history` can only be changed by appending messages.
    #[error("field '{0}' is reserved")]
    ReservedField(String),

    /// The schema declares the same field twice.
    #[error("field '{0}' declared more than once")]
    DuplicateField(String),
}

impl StateValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StateValidationError::UnknownField(_) => "UNKNOWN_FIELD",
            StateValidationError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            StateValidationError::ReservedField(_) => "RESERVED_FIELD",
            StateValidationError::DuplicateField(_) => "DUPLICATE_FIELD",
        }
    }
}

/// Errors raised by checkpoint stores.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted state could not be encoded or decoded.
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),

    /// The storage backend reported a failure.
    #[error("checkpoint backend error: {0}")]
    Backend(String),
}

impl CheckpointError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::Io(_) | CheckpointError::Backend(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CheckpointError::Io(_) => "CHECKPOINT_IO",
            CheckpointError::Serialization(_) => "CHECKPOINT_SERIALIZATION",
            CheckpointError::Backend(_) => "CHECKPOINT_BACKEND",
        }
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        CheckpointError::Serialization(err.to_string())
    }
}

/// Errors raised by a text-completion service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    /// The service could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The service answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request did not finish in time.
    #[error("completion timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The service is not configured (missing key, unknown provider).
    #[error("completion service not configured: {0}")]
    NotConfigured(String),
}

impl CompletionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Connection(_) | CompletionError::Timeout { .. } => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<CompletionError> for HandlerError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout { elapsed_ms } => HandlerError::Timeout { elapsed_ms },
            other => HandlerError::Completion(other.to_string()),
        }
    }
}

/// Errors raised by a tool-invocation channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// No tool with this name is reachable through the channel.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The worker behind the channel is not running.
    #[error("tool worker '{0}' is not running")]
    NotRunning(String),

    /// Writing to or reading from the channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with a protocol-level error.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The payload on the channel was not valid for the protocol.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The call did not finish in time.
    #[error("tool call timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Transport(_) | ToolError::Timeout { .. })
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "TOOL_NOT_FOUND",
            ToolError::NotRunning(_) => "TOOL_NOT_RUNNING",
            ToolError::Transport(_) => "TOOL_TRANSPORT",
            ToolError::Remote { .. } => "TOOL_REMOTE",
            ToolError::Malformed(_) => "TOOL_MALFORMED",
            ToolError::Timeout { .. } => "TOOL_TIMEOUT",
        }
    }

    /// Attach the tool name and turn this into a node failure.
    pub fn into_handler_error(self, tool: &str) -> HandlerError {
        match self {
            ToolError::Timeout { elapsed_ms } => HandlerError::Timeout { elapsed_ms },
            ToolError::Malformed(detail) => HandlerError::MalformedToolResponse {
                tool: tool.to_string(),
                detail,
            },
            other => HandlerError::Tool {
                tool: tool.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result type for checkpoint store operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HandlerError::Tool {
            tool: "search".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "tool 'search' failed: connection reset");

        let err = StateValidationError::ShapeMismatch {
            field: "count".to_string(),
            expected: "integer".to_string(),
            found: "text".to_string(),
        };
        assert_eq!(err.to_string(), "field 'count' expects integer, got text");
    }

    #[test]
    fn test_note_role() {
        assert_eq!(
            ToolError::Malformed("not json".into())
                .into_handler_error("search")
                .note_role(),
            Role::Tool
        );
        assert_eq!(HandlerError::Cancelled.note_role(), Role::Assistant);
        assert_eq!(
            HandlerError::from(CompletionError::Connection("refused".into())).note_role(),
            Role::Assistant
        );
    }

    #[test]
    fn test_timeouts_keep_their_kind() {
        let err: HandlerError = CompletionError::Timeout { elapsed_ms: 500 }.into();
        assert_eq!(err, HandlerError::Timeout { elapsed_ms: 500 });

        let err = ToolError::Timeout { elapsed_ms: 30_000 }.into_handler_error("report");
        assert_eq!(err.error_code(), "TIMEOUT");
    }

    #[test]
    fn test_is_retryable() {
        assert!(
            CompletionError::Status {
                status: 429,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            !CompletionError::Status {
                status: 400,
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(ToolError::Transport("broken pipe".into()).is_retryable());
        assert!(!ToolError::NotFound("x".into()).is_retryable());
    }
}
