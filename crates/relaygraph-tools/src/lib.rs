//! # relaygraph-tools
//!
//! Everything on the far side of the collaborator traits:
//!
//! - [`Tool`] / [`ToolRegistry`] / [`LocalToolChannel`]: in-process tools
//! - [`ToolServer`]: serve a registry over newline-delimited JSON-RPC
//! - [`StdioToolWorker`] / [`WorkerSet`]: reach tool servers running as
//!   child processes
//! - [`EchoCompletion`] and, with the `network` feature,
//!   `OpenAiCompletion`
//!
//! See [`protocol`] for the wire format.

pub mod completion;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod worker;

pub use completion::{EchoCompletion, completion_from_config};
#[cfg(feature = "network")]
pub use completion::openai::OpenAiCompletion;
pub use registry::{LocalToolChannel, Tool, ToolRegistry};
pub use server::ToolServer;
pub use worker::{StdioToolWorker, WorkerSet};
