//! Graph topology and its builder.
//!
//! ```rust,ignore
//! let graph = Graph::builder("support")
//!     .schema(schema)
//!     .node("analysis", analysis)
//!     .node("payment", payment)
//!     .node("final_response", final_response)
//!     .entry("analysis")
//!     .conditional_edge("analysis", FieldRouter::new("inquiry_type", ["payment", "general"]), [
//!         ("payment", "payment"),
//!         ("general", "final_response"),
//!     ])
//!     .edge("payment", "final_response")
//!     .edge("final_response", END)
//!     .build()?;
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use relaygraph_core::{State, StateSchema};
use tracing::warn;

use crate::error::{GraphError, RoutingError, RunError};
use crate::node::{Node, NodeHandler};
use crate::router::{Route, Router};

/// Terminal marker. Usable anywhere a target name is accepted.
pub const END: &str = "__end__";

/// Destination of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == END {
            Target::End
        } else {
            Target::Node(name.to_string())
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::from(name.as_str())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(name) => f.write_str(name),
            Target::End => f.write_str("END"),
        }
    }
}

enum EdgePolicy {
    Fixed(Target),
    Conditional {
        router: Arc<dyn Router>,
        mapping: BTreeMap<String, Target>,
    },
}

/// Validated, immutable graph.
pub struct Graph {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    edges: HashMap<String, EdgePolicy>,
    entry: String,
}

impl Graph {
    pub fn builder(name: impl Into<String>) -> GraphBuilder {
        GraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Pick the successor of `from` given the merged state.
    pub fn next(&self, from: &str, state: &State) -> Result<Target, RunError> {
        match self.edges.get(from) {
            Some(EdgePolicy::Fixed(target)) => Ok(target.clone()),
            Some(EdgePolicy::Conditional { router, mapping }) => match router.route(state) {
                Route::End => Ok(Target::End),
                Route::Label(label) => match mapping.get(&label) {
                    Some(target) => Ok(target.clone()),
                    None => Err(RoutingError {
                        node: from.to_string(),
                        label,
                    }
                    .into()),
                },
            },
            None => Err(GraphError::MissingEdge(from.to_string()).into()),
        }
    }

    fn successors(&self, from: &str) -> Vec<&Target> {
        match self.edges.get(from) {
            Some(EdgePolicy::Fixed(target)) => vec![target],
            Some(EdgePolicy::Conditional { mapping, .. }) => mapping.values().collect(),
            None => Vec::new(),
        }
    }

    fn unreachable_nodes(&self) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([self.entry.as_str()]);
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            for target in self.successors(name) {
                if let Target::Node(next) = target {
                    queue.push_back(next.as_str());
                }
            }
        }
        self.node_names().filter(|n| !seen.contains(n)).collect()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} (entry: {})", self.name, self.entry)?;
        for name in &self.order {
            match self.edges.get(name) {
                Some(EdgePolicy::Fixed(target)) => writeln!(f, "  {name} -> {target}")?,
                Some(EdgePolicy::Conditional { mapping, .. }) => {
                    let branches: Vec<String> = mapping
                        .iter()
                        .map(|(label, target)| format!("{label}: {target}"))
                        .collect();
                    writeln!(f, "  {name} -> [{}]", branches.join(" | "))?;
                }
                None => writeln!(f, "  {name}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .finish()
    }
}

enum PendingEdge {
    Fixed(Target),
    Conditional {
        router: Arc<dyn Router>,
        /// `None`: every label names its target directly.
        mapping: Option<BTreeMap<String, Target>>,
    },
}

/// Collects nodes and edges, then validates them in [`GraphBuilder::build`].
pub struct GraphBuilder {
    name: String,
    schema: StateSchema,
    nodes: Vec<Node>,
    edges: Vec<(String, PendingEdge)>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::history_only(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn node(self, name: impl Into<String>, handler: impl NodeHandler + 'static) -> Self {
        self.node_arc(name, Arc::new(handler))
    }

    pub fn node_arc(mut self, name: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        self.nodes.push(Node::new(name, handler));
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional edge. `to` may be [`END`].
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<Target>) -> Self {
        self.edges.push((from.into(), PendingEdge::Fixed(to.into())));
        self
    }

    /// Conditional edge with an explicit label mapping.
    pub fn conditional_edge<I, K, T>(
        mut self,
        from: impl Into<String>,
        router: impl Router + 'static,
        mapping: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Target>,
    {
        let mapping = mapping
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.edges.push((
            from.into(),
            PendingEdge::Conditional {
                router: Arc::new(router),
                mapping: Some(mapping),
            },
        ));
        self
    }

    /// Conditional edge whose router labels are node names (or [`END`]).
    pub fn route_by_label(mut self, from: impl Into<String>, router: impl Router + 'static) -> Self {
        self.edges.push((
            from.into(),
            PendingEdge::Conditional {
                router: Arc::new(router),
                mapping: None,
            },
        ));
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let mut nodes = HashMap::new();
        let mut order = Vec::new();
        for node in self.nodes {
            let name = node.name().to_string();
            if name.trim().is_empty() || name == END {
                return Err(GraphError::InvalidNodeName(name));
            }
            if nodes.contains_key(&name) {
                return Err(GraphError::DuplicateNode(name));
            }
            order.push(name.clone());
            nodes.insert(name, node);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode {
                name: entry,
                referenced_by: "the entry point".to_string(),
            });
        }

        let mut edges = HashMap::new();
        for (from, pending) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(GraphError::UnknownNode {
                    name: from,
                    referenced_by: "an edge source".to_string(),
                });
            }
            if edges.contains_key(&from) {
                return Err(GraphError::ConflictingEdges(from));
            }
            let policy = match pending {
                PendingEdge::Fixed(target) => {
                    check_target(&nodes, &from, &target)?;
                    EdgePolicy::Fixed(target)
                }
                PendingEdge::Conditional { router, mapping } => {
                    let labels = router.labels();
                    let mapping = mapping.unwrap_or_else(|| {
                        labels
                            .iter()
                            .map(|label| (label.clone(), Target::from(label.as_str())))
                            .collect()
                    });
                    for label in &labels {
                        if !mapping.contains_key(label) {
                            return Err(GraphError::UnmappedLabel {
                                node: from,
                                label: label.clone(),
                            });
                        }
                    }
                    for (label, target) in &mapping {
                        if !labels.contains(label) {
                            return Err(GraphError::UndeclaredLabel {
                                node: from,
                                label: label.clone(),
                            });
                        }
                        check_target(&nodes, &from, target)?;
                    }
                    EdgePolicy::Conditional { router, mapping }
                }
            };
            edges.insert(from, policy);
        }

        if let Some(missing) = order.iter().find(|name| !edges.contains_key(*name)) {
            return Err(GraphError::MissingEdge(missing.clone()));
        }

        let graph = Graph {
            name: self.name,
            schema: self.schema,
            nodes,
            order,
            edges,
            entry,
        };
        for node in graph.unreachable_nodes() {
            warn!(graph = %graph.name, node = %node, "Node is unreachable from the entry point");
        }
        Ok(graph)
    }
}

fn check_target(nodes: &HashMap<String, Node>, from: &str, target: &Target) -> Result<(), GraphError> {
    match target {
        Target::Node(name) if !nodes.contains_key(name) => Err(GraphError::UnknownNode {
            name: name.clone(),
            referenced_by: format!("the edge from '{from}'"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::handler_fn;
    use crate::router::{FieldRouter, router_fn};
    use relaygraph_core::{HandlerError, StateUpdate};

    fn noop() -> impl NodeHandler {
        handler_fn(|_: &State| Ok::<_, HandlerError>(StateUpdate::new()))
    }

    #[test]
    fn test_builds_valid_graph() {
        let graph = Graph::builder("linear")
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .edge("a", "b")
            .edge("b", END)
            .build()
            .unwrap();
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(graph.next("a", &State::new()).unwrap(), Target::node("b"));
        assert_eq!(graph.next("b", &State::new()).unwrap(), Target::End);
    }

    #[test]
    fn test_duplicate_node() {
        let err = Graph::builder("g")
            .node("a", noop())
            .node("a", noop())
            .entry("a")
            .edge("a", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".into()));
    }

    #[test]
    fn test_entry_must_exist() {
        let err = Graph::builder("g")
            .node("a", noop())
            .edge("a", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::MissingEntry);

        let err = Graph::builder("g")
            .node("a", noop())
            .entry("b")
            .edge("a", END)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref name, .. } if name == "b"));
    }

    #[test]
    fn test_edge_to_missing_node() {
        let err = Graph::builder("g")
            .node("a", noop())
            .entry("a")
            .edge("a", "ghost")
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown node 'ghost' referenced by the edge from 'a'"
        );
    }

    #[test]
    fn test_fixed_and_conditional_edges_conflict() {
        let err = Graph::builder("g")
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .edge("a", "b")
            .route_by_label("a", router_fn(["b"], |_: &State| Route::label("b")))
            .edge("b", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::ConflictingEdges("a".into()));
    }

    #[test]
    fn test_every_node_needs_an_edge() {
        let err = Graph::builder("g")
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .edge("a", "b")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::MissingEdge("b".into()));
    }

    #[test]
    fn test_router_labels_must_be_mapped() {
        let err = Graph::builder("g")
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .conditional_edge(
                "a",
                FieldRouter::new("next", ["b", "c"]),
                [("b", "b")],
            )
            .edge("b", END)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnmappedLabel {
                node: "a".into(),
                label: "c".into()
            }
        );

        let err = Graph::builder("g")
            .node("a", noop())
            .entry("a")
            .conditional_edge("a", FieldRouter::new("next", ["x"]), [("x", END), ("y", END)])
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UndeclaredLabel { ref label, .. } if label == "y"));
    }

    #[test]
    fn test_route_by_label_requires_existing_nodes() {
        let err = Graph::builder("g")
            .node("a", noop())
            .entry("a")
            .route_by_label("a", FieldRouter::new("next", ["a", "missing"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_reserved_node_name() {
        let err = Graph::builder("g")
            .node(END, noop())
            .entry(END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::InvalidNodeName(END.into()));
    }

    #[test]
    fn test_unknown_label_is_routing_error() {
        let graph = Graph::builder("g")
            .node("a", noop())
            .entry("a")
            .conditional_edge("a", FieldRouter::new("next", ["done"]), [("done", END)])
            .build()
            .unwrap();
        let state = State::new().with_field("next", "elsewhere");
        let err = graph.next("a", &state).unwrap_err();
        assert!(matches!(err, RunError::Routing(RoutingError { ref label, .. }) if label == "elsewhere"));
    }

    #[test]
    fn test_display_outline() {
        let graph = Graph::builder("support")
            .node("analysis", noop())
            .node("payment", noop())
            .entry("analysis")
            .conditional_edge(
                "analysis",
                FieldRouter::new("inquiry_type", ["payment", "general"]),
                [("payment", "payment"), ("general", END)],
            )
            .edge("payment", END)
            .build()
            .unwrap();
        let outline = graph.to_string();
        assert!(outline.starts_with("graph support (entry: analysis)"));
        assert!(outline.contains("analysis -> [general: END | payment: payment]"));
        assert!(outline.contains("payment -> END"));
    }
}
