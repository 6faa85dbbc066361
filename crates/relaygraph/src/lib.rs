//! # relaygraph
//!
//! Graph-routed orchestration of completion and tool-calling workers: a
//! directed graph of named nodes runs over a typed state record whose
//! history only grows, routers pick the next node, and a checkpoint store
//! lets a session pick up where its last run stopped.
//!
//! ## Core Components
//!
//! - **[Graph]** / **[Executor]**: build a validated graph, run it
//! - **[State]** / **[StateSchema]**: the record threaded through a run
//! - **[Router]**, **[KeywordClassifier]**: conditional edges
//! - **[CheckpointStore]**: in-memory, file and SQLite backends
//! - **[ToolChannel]**: in-process registries and stdio tool workers
//! - **[CompletionService]**: offline echo and OpenAI-compatible clients
//!
//! ## Quick Start
//!
//! ```rust
//! use relaygraph::{END, Executor, Graph, Message, State, StateUpdate, handler_fn};
//!
//! # tokio_test::block_on(async {
//! let graph = Graph::builder("hello")
//!     .node("greet", handler_fn(|state: &State| {
//!         let reply = format!("hello, {}", state.latest_user_text());
//!         Ok(StateUpdate::new().message(Message::assistant(reply)))
//!     }))
//!     .entry("greet")
//!     .edge("greet", END)
//!     .build()
//!     .unwrap();
//!
//! let outcome = Executor::new()
//!     .run(&graph, State::from_message(Message::user("relay")), None)
//!     .await;
//! assert_eq!(outcome.reply(), Some("hello, relay"));
//! # });
//! ```

pub use relaygraph_core as core;
pub use relaygraph_graph as graph;
pub use relaygraph_memory as memory;
pub use relaygraph_tools as tools;

#[cfg(feature = "agents")]
pub use relaygraph_agents as agents;
#[cfg(feature = "testing")]
pub use relaygraph_testing as testing;

// ============================================================================
// State and messages
// ============================================================================

pub use relaygraph_core::{
    FieldShape, FieldSpec, HISTORY_FIELD, InvalidSessionId, Message, Role, SessionId, State,
    StateSchema, StateUpdate,
};

// ============================================================================
// Collaborators
// ============================================================================

pub use relaygraph_core::{
    CheckpointInfo, CheckpointStore, CompletionOptions, CompletionService, ToolChannel,
    ToolDescriptor, ToolResponse,
};

// Configuration
pub use relaygraph_core::RelayConfig;

// Error types
pub use relaygraph_core::{
    CheckpointError, CheckpointResult, CompletionError, ConfigError, HandlerError, HandlerResult,
    StateValidationError, ToolError,
};

// ============================================================================
// Graphs and execution
// ============================================================================

pub use relaygraph_graph::{
    AsyncFnHandler, CancelHandle, CancelSignal, ClassifierRouter, END, Executor, ExecutorConfig,
    FieldRouter, FnHandler, FnRouter, Graph, GraphBuilder, GraphError, KeywordClassifier,
    KeywordRule, Node, NodeHandler, Route, Router, RoutingError, RunError, RunOutcome, RunStatus,
    Target, async_handler, cancellation, handler_fn, router_fn,
};

// ============================================================================
// Checkpoint backends
// ============================================================================

pub use relaygraph_memory::{FileCheckpointStore, InMemoryCheckpointStore, open_store};

#[cfg(feature = "sqlite")]
pub use relaygraph_memory::SqliteCheckpointStore;

// ============================================================================
// Tools and completion clients
// ============================================================================

pub use relaygraph_tools::{
    EchoCompletion, LocalToolChannel, StdioToolWorker, Tool, ToolRegistry, ToolServer, WorkerSet,
    completion_from_config,
};

#[cfg(feature = "network")]
pub use relaygraph_tools::OpenAiCompletion;
