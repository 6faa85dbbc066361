//! Session checkpoint storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointResult;
use crate::session::SessionId;
use crate::state::State;

/// Summary of a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub session_id: SessionId,
    pub updated_at: DateTime<Utc>,
    pub history_len: usize,
}

/// Ledger mapping a session id to its most recently persisted state.
///
/// Implementations must give read-after-write consistency for one session id
/// accessed sequentially. Running two executions against the same session id
/// at the same time is not supported; callers keep at most one active run per
/// session.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest state for the session, `None` if nothing was saved.
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>>;

    /// Replace the stored state for the session.
    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()>;

    /// Remove the session. Returns whether anything was stored.
    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool>;

    /// All stored sessions, most recently updated first.
    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>>;

    async fn exists(&self, session: &SessionId) -> CheckpointResult<bool> {
        Ok(self.load(session).await?.is_some())
    }

    /// Backend name used in logs.
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>> {
        (**self).load(session).await
    }

    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()> {
        (**self).save(session, state).await
    }

    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool> {
        (**self).delete(session).await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>> {
        (**self).list().await
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}
