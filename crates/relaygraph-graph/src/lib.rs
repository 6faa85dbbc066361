//! # relaygraph-graph
//!
//! Build a graph of named nodes, connect them with fixed and conditional
//! edges, and run it with the [`Executor`].
//!
//! ```rust,ignore
//! let graph = Graph::builder("support")
//!     .node("analysis", analysis)
//!     .node("payment", payment)
//!     .entry("analysis")
//!     .route_by_label("analysis", ClassifierRouter::new(classifier))
//!     .edge("payment", END)
//!     .build()?;
//!
//! let outcome = Executor::new().run(&graph, state, Some(&session)).await;
//! ```

pub mod cancel;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod router;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use classifier::{ClassifierRouter, KeywordClassifier, KeywordRule};
pub use error::{GraphError, RoutingError, RunError};
pub use executor::{Executor, ExecutorConfig, RunOutcome, RunStatus};
pub use graph::{END, Graph, GraphBuilder, Target};
pub use node::{AsyncFnHandler, FnHandler, Node, NodeHandler, async_handler, handler_fn};
pub use router::{FieldRouter, FnRouter, Route, Router, router_fn};
