//! # relaygraph-agents
//!
//! Ready-made flows built on `relaygraph-graph`:
//!
//! - [`support`]: keyword-classified customer support desk
//! - [`research`]: supervisor looping over two remote experts
//! - [`analysis`]: question to SQL to report over a sales database
//! - [`district`]: single-node client of the remote district analyst
//! - [`assistant`]: manual-grounded question answering
//! - [`experts`]: the tools behind the remote experts, and their servers

pub mod analysis;
pub mod assistant;
pub mod district;
pub mod error;
pub mod experts;
pub mod research;
pub mod support;

pub use analysis::{SalesDatabase, analysis_graph};
pub use assistant::{KnowledgeBase, assistant_graph};
pub use district::district_graph;
pub use error::{AgentError, AgentResult};
pub use experts::{
    DistrictAnalysisTool, ExpertServer, GreetingTool, MarketResearchTool, ReportWritingTool,
};
pub use research::research_graph;
pub use support::support_graph;
