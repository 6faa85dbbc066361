//! Node handlers.
//!
//! A handler maps the current state to a partial update. Handlers that need
//! an external collaborator hold it themselves (an `Arc<dyn ToolChannel>`,
//! an `Arc<dyn CompletionService>`), injected when the graph is built.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{HandlerError, State, StateUpdate};

/// Unit of work behind a graph node.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError>;
}

#[async_trait]
impl<T: NodeHandler + ?Sized> NodeHandler for Arc<T> {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        (**self).run(state).await
    }
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F>(F);

/// Wrap a synchronous function as a node handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&State) -> Result<StateUpdate, HandlerError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(&State) -> Result<StateUpdate, HandlerError> + Send + Sync,
{
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        (self.0)(state)
    }
}

/// Handler backed by an async closure. The closure receives its own copy of
/// the state so the returned future can be `'static`.
pub struct AsyncFnHandler<F>(F);

pub fn async_handler<F, Fut>(f: F) -> AsyncFnHandler<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, HandlerError>> + Send + 'static,
{
    AsyncFnHandler(f)
}

#[async_trait]
impl<F, Fut> NodeHandler for AsyncFnHandler<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, HandlerError>> + Send + 'static,
{
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        (self.0)(state.clone()).await
    }
}

/// Named node of a graph.
#[derive(Clone)]
pub struct Node {
    name: String,
    handler: Arc<dyn NodeHandler>,
}

impl Node {
    pub fn new(name: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &dyn NodeHandler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_core::Message;

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = handler_fn(|state: &State| {
            Ok(StateUpdate::new().message(Message::assistant(format!(
                "echo: {}",
                state.latest_user_text()
            ))))
        });
        let update = handler
            .run(&State::from_message(Message::user("hello")))
            .await
            .unwrap();
        assert_eq!(update.new_messages()[0].content, "echo: hello");
    }

    #[tokio::test]
    async fn test_async_handler() {
        let handler = async_handler(|state: State| async move {
            tokio::task::yield_now().await;
            if state.history().is_empty() {
                Err(HandlerError::failed("nothing to do"))
            } else {
                Ok(StateUpdate::new().set("seen", state.history().len() as i64))
            }
        });

        let err = handler.run(&State::new()).await.unwrap_err();
        assert_eq!(err, HandlerError::Failed("nothing to do".into()));

        let update = handler
            .run(&State::from_message(Message::user("x")))
            .await
            .unwrap();
        assert_eq!(update.changed_fields()["seen"], 1);
    }
}
