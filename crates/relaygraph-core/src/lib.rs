//! # relaygraph-core
//!
//! Shared vocabulary of the relaygraph workspace:
//!
//! - **[State]** / **[StateUpdate]**: the record threaded through a run and
//!   the partial updates nodes return
//! - **[StateSchema]**: declared field shapes, checked at every merge
//! - **[Message]**: append-only history entries
//! - **[CompletionService]**, **[ToolChannel]**, **[CheckpointStore]**: the
//!   external collaborators a graph talks to
//! - **[RelayConfig]**: `relaygraph.toml`

pub mod checkpoint;
pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod schema;
pub mod session;
pub mod state;
pub mod tool;

pub use checkpoint::{CheckpointInfo, CheckpointStore};
pub use completion::{CompletionOptions, CompletionService};
pub use config::RelayConfig;
pub use error::{
    CheckpointError, CheckpointResult, CompletionError, ConfigError, HandlerError, HandlerResult,
    StateValidationError, ToolError,
};
pub use message::{Message, Role};
pub use schema::{FieldShape, FieldSpec, StateSchema};
pub use session::{InvalidSessionId, SessionId};
pub use state::{HISTORY_FIELD, State, StateUpdate};
pub use tool::{ToolChannel, ToolDescriptor, ToolResponse};
