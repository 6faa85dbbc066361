//! Small nodes and graphs for executor tests.

use relaygraph_core::{HandlerError, Message, State, StateUpdate};
use relaygraph_graph::{END, Graph, GraphError, NodeHandler, handler_fn};

/// State holding a single user message.
pub fn user_state(text: &str) -> State {
    State::from_message(Message::user(text))
}

/// Node appending an assistant message with `text`.
pub fn reply_node(text: &str) -> impl NodeHandler + use<> {
    let text = text.to_string();
    handler_fn(move |_: &State| Ok(StateUpdate::new().message(Message::assistant(text.clone()))))
}

/// Node that echoes the latest user message back as `echo: <text>`.
pub fn echo_node() -> impl NodeHandler {
    handler_fn(|state: &State| {
        Ok(StateUpdate::new().message(Message::assistant(format!(
            "echo: {}",
            state.latest_user_text()
        ))))
    })
}

/// Node that always fails with `error`.
pub fn failing_node(error: HandlerError) -> impl NodeHandler {
    handler_fn(move |_: &State| Err(error.clone()))
}

/// `names[0] -> names[1] -> ... -> END`, each node replying with its name.
pub fn linear_graph(name: &str, names: &[&str]) -> Result<Graph, GraphError> {
    let mut builder = Graph::builder(name);
    for (i, node) in names.iter().enumerate() {
        builder = builder.node(*node, reply_node(*node));
        builder = match names.get(i + 1) {
            Some(next) => builder.edge(*node, *next),
            None => builder.edge(*node, END),
        };
    }
    if let Some(first) = names.first() {
        builder = builder.entry(*first);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_graph::Executor;

    #[tokio::test]
    async fn test_linear_graph_fixture() {
        let graph = linear_graph("chain", &["a", "b", "c"]).unwrap();
        let outcome = Executor::new().run(&graph, user_state("hi"), None).await;
        assert_eq!(outcome.path, vec!["a", "b", "c"]);
        assert_eq!(outcome.reply(), Some("c"));
    }

    #[test]
    fn test_empty_linear_graph_has_no_entry() {
        assert_eq!(linear_graph("empty", &[]).unwrap_err(), GraphError::MissingEntry);
    }
}
