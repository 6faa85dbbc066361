//! # relaygraph-testing
//!
//! Deterministic stand-ins for the external collaborators of a graph, plus
//! small fixtures:
//!
//! - [`ScriptedCompletion`]: canned completion replies, records prompts
//! - [`MockToolChannel`]: canned tool envelopes, records calls
//! - [`FailingCheckpointStore`]: injects checkpoint failures
//! - [`fixtures`]: reply/echo/failing nodes and linear graphs

pub mod fixtures;
pub mod mock_completion;
pub mod mock_tools;
pub mod stores;

pub use fixtures::{echo_node, failing_node, linear_graph, reply_node, user_state};
pub use mock_completion::ScriptedCompletion;
pub use mock_tools::MockToolChannel;
pub use stores::{FailOn, FailingCheckpointStore};
