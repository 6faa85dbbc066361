//! The step executor.
//!
//! One run walks the graph from its entry node: invoke the node, check its
//! update against the schema, merge, persist, route, repeat until the
//! terminal marker. Any failure stops the run; the caller always receives a
//! [`RunOutcome`] whose history explains what happened, never a panic or an
//! `Err`.

use std::sync::Arc;
use std::time::Instant;

use relaygraph_core::config::ExecutorSettings;
use relaygraph_core::{CheckpointStore, HandlerError, Message, SessionId, State, StateUpdate};
use tracing::{Instrument, debug, debug_span, info, info_span, warn};

use crate::cancel::CancelSignal;
use crate::error::{GraphError, RunError};
use crate::graph::{Graph, Target};
use crate::node::Node;

/// Executor limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound on node executions per run; guards looping graphs.
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_steps: 25 }
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    /// The terminal marker was reached.
    Completed,
    /// The run stopped early; the error is also described in the history.
    Aborted(RunError),
}

/// Result of [`Executor::run`].
#[derive(Debug)]
pub struct RunOutcome {
    pub state: State,
    pub status: RunStatus,
    /// Nodes entered, in order.
    pub path: Vec<String>,
    /// Whether the run continued a checkpointed session.
    pub resumed: bool,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    pub fn error(&self) -> Option<&RunError> {
        match &self.status {
            RunStatus::Completed => None,
            RunStatus::Aborted(err) => Some(err),
        }
    }

    /// Content of the last history entry.
    pub fn reply(&self) -> Option<&str> {
        self.state.last_message().map(|m| m.content.as_str())
    }
}

/// Runs graphs, optionally checkpointing every step.
///
/// The executor holds no per-run state; one instance can drive any number of
/// concurrent runs as long as each uses its own session id.
#[derive(Clone, Default)]
pub struct Executor {
    store: Option<Arc<dyn CheckpointStore>>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn checkpoint_store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.store.as_ref()
    }

    /// Run `graph` from its entry node.
    ///
    /// With a session id and a checkpoint store, the stored state for that
    /// session (if any) replaces `initial`, and the history entries of
    /// `initial` are appended to it as the new trigger. The merged state is
    /// saved after every completed step.
    pub async fn run(&self, graph: &Graph, initial: State, session: Option<&SessionId>) -> RunOutcome {
        self.run_with_cancel(graph, initial, session, CancelSignal::never())
            .await
    }

    /// Like [`run`](Self::run); a fired `cancel` aborts the node currently
    /// suspended on an external call.
    pub async fn run_with_cancel(
        &self,
        graph: &Graph,
        initial: State,
        session: Option<&SessionId>,
        cancel: CancelSignal,
    ) -> RunOutcome {
        let span = info_span!(
            "graph_run",
            graph = %graph.name(),
            session = session.map(SessionId::as_str).unwrap_or("-")
        );
        self.execute(graph, initial, session, cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        graph: &Graph,
        initial: State,
        session: Option<&SessionId>,
        mut cancel: CancelSignal,
    ) -> RunOutcome {
        let started = Instant::now();
        let mut path = Vec::new();

        let (mut state, resumed) = match self.starting_state(graph, initial, session).await {
            Ok(start) => start,
            Err((state, err)) => return abort(state, err, path, false),
        };
        info!(resumed, history = state.history().len(), "Run started");

        let store = match (&self.store, session) {
            (Some(store), Some(session)) => Some((store, session)),
            _ => None,
        };

        let mut current = Target::node(graph.entry());
        let mut steps = 0usize;
        while let Target::Node(name) = current {
            if steps >= self.config.max_steps {
                let err = RunError::StepLimitExceeded {
                    limit: self.config.max_steps,
                };
                return abort(state, err, path, resumed);
            }
            steps += 1;

            let Some(node) = graph.node(&name) else {
                let err = GraphError::UnknownNode {
                    name,
                    referenced_by: "the executor".to_string(),
                };
                return abort(state, err.into(), path, resumed);
            };
            path.push(name.clone());
            debug!(node = %name, step = steps, "Executing node");

            let update = match run_node(node, &state, &mut cancel)
                .instrument(debug_span!("graph_node", node = %name))
                .await
            {
                Ok(update) => update,
                Err(source) => {
                    return abort(state, RunError::Handler { node: name, source }, path, resumed);
                }
            };

            if let Err(source) = graph.schema().check_update(&update) {
                let err = RunError::StateValidation { node: name, source };
                return abort(state, err, path, resumed);
            }
            debug!(
                node = %name,
                messages = update.new_messages().len(),
                fields = update.changed_fields().len(),
                "Merging update"
            );
            // a step counts as merged only once its checkpoint is written
            match store {
                Some((store, session)) => {
                    let mut merged = state.clone();
                    merged.apply(update);
                    if let Err(err) = store.save(session, &merged).await {
                        return abort(state, err.into(), path, resumed);
                    }
                    state = merged;
                }
                None => state.apply(update),
            }

            current = match graph.next(&name, &state) {
                Ok(next) => next,
                Err(err) => return abort(state, err, path, resumed),
            };
            debug!(from = %name, to = %current, "Routed");
        }

        info!(
            steps,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run completed"
        );
        RunOutcome {
            state,
            status: RunStatus::Completed,
            path,
            resumed,
        }
    }

    async fn starting_state(
        &self,
        graph: &Graph,
        initial: State,
        session: Option<&SessionId>,
    ) -> Result<(State, bool), (State, RunError)> {
        let schema = graph.schema();
        let initial = match schema.conform(initial.clone()) {
            Ok(conformed) => conformed,
            Err(err) => return Err((initial, RunError::InvalidStartState(err))),
        };

        let (store, session) = match (&self.store, session) {
            (Some(store), Some(session)) => (store, session),
            (None, Some(_)) => {
                warn!("Session id given but no checkpoint store configured; state will not persist");
                return Ok((initial, false));
            }
            _ => return Ok((initial, false)),
        };

        match store.load(session).await {
            Ok(None) => Ok((initial, false)),
            Ok(Some(persisted)) => {
                let mut resumed = schema
                    .conform(persisted)
                    .map_err(|err| (initial.clone(), RunError::InvalidStartState(err)))?;
                for message in initial.history() {
                    resumed.append_message(message.clone());
                }
                debug!(backend = store.backend(), "Resuming from checkpoint");
                Ok((resumed, true))
            }
            Err(err) => Err((initial, err.into())),
        }
    }
}

async fn run_node(
    node: &Node,
    state: &State,
    cancel: &mut CancelSignal,
) -> Result<StateUpdate, HandlerError> {
    if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HandlerError::Cancelled),
        result = node.handler().run(state) => result,
    }
}

/// Stop the run: append a human-readable note and report the error.
fn abort(mut state: State, error: RunError, path: Vec<String>, resumed: bool) -> RunOutcome {
    warn!(error = %error, code = error.error_code(), "Run aborted");

    let text = if error.is_cancelled() {
        match error.node() {
            Some(node) => format!("Run cancelled while node '{node}' was running."),
            None => "Run cancelled.".to_string(),
        }
    } else {
        format!("Run aborted: {error}")
    };
    let mut note = Message::new(error.note_role(), text).with_metadata("error_code", error.error_code());
    if let Some(node) = error.node() {
        note = note.with_metadata("node", node);
    }
    state.append_message(note);

    RunOutcome {
        state,
        status: RunStatus::Aborted(error),
        path,
        resumed,
    }
}
