use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaygraph_core::{CheckpointInfo, CheckpointResult, CheckpointStore, SessionId, State};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    state: State,
    updated_at: DateTime<Utc>,
}

/// Process-local checkpoint store.
///
/// Sessions are lost when the process exits. Suitable for tests and for
/// console sessions that do not need to survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .map(|entry| entry.state.clone()))
    }

    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()> {
        debug!(session = %session, history = state.history().len(), "Saving checkpoint to memory");
        self.sessions.write().await.insert(
            session.clone(),
            Entry {
                state: state.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool> {
        Ok(self.sessions.write().await.remove(session).is_some())
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<_> = sessions
            .iter()
            .map(|(session, entry)| CheckpointInfo {
                session_id: session.clone(),
                updated_at: entry.updated_at,
                history_len: entry.state.history().len(),
            })
            .collect();
        crate::sort_most_recent_first(&mut infos);
        Ok(infos)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
